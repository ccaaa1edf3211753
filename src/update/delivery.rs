//! The delivery capability seam.
//!
//! A delivery capability knows how to talk to a release feed, fetch an
//! installer and hand over to it. The coordinator drives it and owns every
//! state decision; the capability only reports what happened through
//! [`DeliveryEvents`].

use anyhow::Result;
use futures::future::{self, BoxFuture};
use futures::FutureExt;

use super::coordinator::Lifecycle;
use super::{DeliveryEvent, UpdateInfo};

/// Something that can check for, download and install application updates.
///
/// Implementations serialize their own operations; the coordinator never
/// issues a second check or download while one is outstanding.
pub trait UpdateDelivery: Send + Sync {
    /// `false` for the null capability used when no update feed exists
    fn is_available(&self) -> bool {
        true
    }

    /// Look for a newer release. `Ok(None)` means the running version is current.
    fn check_for_updates<'a>(
        &'a self,
        events: &'a DeliveryEvents,
    ) -> BoxFuture<'a, Result<Option<UpdateInfo>>>;

    /// Download the release found by the last successful check
    fn download_update<'a>(&'a self, events: &'a DeliveryEvents) -> BoxFuture<'a, Result<UpdateInfo>>;

    /// Hand over to the downloaded installer and exit the process.
    ///
    /// Only returns if the installer could not be started.
    fn quit_and_install(&self) -> Result<()>;
}

/// Handler set registered by the coordinator; capabilities report lifecycle
/// events through it.
#[derive(Clone)]
pub struct DeliveryEvents {
    lifecycle: Lifecycle,
}

impl DeliveryEvents {
    pub(super) fn new(lifecycle: Lifecycle) -> Self {
        Self { lifecycle }
    }

    /// Report a lifecycle event. Handled synchronously, in order.
    pub fn emit(&self, event: DeliveryEvent) {
        self.lifecycle.handle(event);
    }
}

/// Stand-in capability for development builds, where no update feed exists
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDelivery;

impl UpdateDelivery for NullDelivery {
    fn is_available(&self) -> bool {
        false
    }

    fn check_for_updates<'a>(
        &'a self,
        _events: &'a DeliveryEvents,
    ) -> BoxFuture<'a, Result<Option<UpdateInfo>>> {
        future::ready(Ok(None)).boxed()
    }

    fn download_update<'a>(&'a self, _events: &'a DeliveryEvents) -> BoxFuture<'a, Result<UpdateInfo>> {
        future::ready(Err(anyhow::anyhow!("No update feed in this build"))).boxed()
    }

    fn quit_and_install(&self) -> Result<()> {
        Ok(())
    }
}
