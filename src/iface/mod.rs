//! Contract for the virtual network device a connection feeds.
//!
//! Creating real TUN/TAP devices is left to the embedding application; the
//! connection only reads and writes whole frames through
//! [`VirtualInterface`].

pub mod memory;

use std::{io, sync::Arc};

use async_trait::async_trait;

/// A packet-oriented virtual network device.
#[async_trait]
pub trait VirtualInterface: Send + Sync + 'static {
    /// Read one frame into `buf`, returning its length.
    ///
    /// # Errors
    ///
    /// Any error ends the connection's interface read loop.
    async fn read_packet(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write one frame to the device.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the device rejects the frame or is closed.
    async fn write_packet(&self, packet: &[u8]) -> io::Result<()>;

    /// Release the device.
    async fn close(&self);
}

/// A virtual interface together with its ownership flag.
///
/// Only a managed interface is closed when the connection closes; a
/// borrowed one belongs to somebody else.
#[derive(Clone)]
pub struct InterfaceHandle {
    iface: Arc<dyn VirtualInterface>,
    managed: bool,
}

impl InterfaceHandle {
    /// An interface owned by the connection.
    pub fn managed(iface: Arc<dyn VirtualInterface>) -> Self {
        Self {
            iface,
            managed: true,
        }
    }

    /// An interface shared with, and closed by, another owner.
    pub fn borrowed(iface: Arc<dyn VirtualInterface>) -> Self {
        Self {
            iface,
            managed: false,
        }
    }

    #[must_use]
    pub fn is_managed(&self) -> bool { self.managed }

    #[must_use]
    pub fn iface(&self) -> &Arc<dyn VirtualInterface> { &self.iface }
}

impl std::fmt::Debug for InterfaceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterfaceHandle")
            .field("managed", &self.managed)
            .finish_non_exhaustive()
    }
}
