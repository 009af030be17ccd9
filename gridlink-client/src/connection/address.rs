//! Sources of candidate member addresses.

use std::net::SocketAddr;

use async_trait::async_trait;
use gridlink_core::Result;

/// Supplies the addresses the client tries when it (re)connects to the cluster.
#[async_trait]
pub trait AddressProvider: Send + Sync + std::fmt::Debug {
    /// Returns the addresses to try, in preference order.
    async fn load_addresses(&self) -> Result<Vec<SocketAddr>>;

    /// Maps an address reported by a member to the address the client must
    /// dial. `None` means the address is not reachable from the client.
    async fn translate(&self, address: SocketAddr) -> Result<Option<SocketAddr>> {
        Ok(Some(address))
    }
}

/// Address provider backed by a pre-configured list of addresses.
#[derive(Debug, Clone)]
pub struct StaticAddressProvider {
    addresses: Vec<SocketAddr>,
}

impl StaticAddressProvider {
    /// Creates a provider for the given addresses.
    pub fn new(addresses: Vec<SocketAddr>) -> Self {
        Self { addresses }
    }

    /// Creates a provider for a single address.
    pub fn from_address(address: SocketAddr) -> Self {
        Self::new(vec![address])
    }

    /// Returns the configured addresses.
    pub fn addresses(&self) -> &[SocketAddr] {
        &self.addresses
    }
}

impl Default for StaticAddressProvider {
    fn default() -> Self {
        Self::from_address(SocketAddr::from(([127, 0, 0, 1], 5701)))
    }
}

#[async_trait]
impl AddressProvider for StaticAddressProvider {
    async fn load_addresses(&self) -> Result<Vec<SocketAddr>> {
        Ok(self.addresses.clone())
    }
}

impl<T> From<T> for StaticAddressProvider
where
    T: IntoIterator<Item = SocketAddr>,
{
    fn from(addresses: T) -> Self {
        Self::new(addresses.into_iter().collect())
    }
}
