//! Bridge configuration.

use tether_core::HostNumber;

/// Settings fixed for the lifetime of a [`Bridge`](crate::Bridge).
///
/// # Example
///
/// ```
/// use tether::BridgeConfig;
/// use tether_core::HostNumber;
///
/// let config = BridgeConfig::default()
///     .with_host_number(HostNumber::INT)
///     .with_max_params(8);
/// assert_eq!(config.host_number, HostNumber::INT);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// The host runtime's native number representation. Enum constants are
    /// checked against it at registration.
    pub host_number: HostNumber,
    /// Pin object arguments as host roots while a native callable runs, so a
    /// reentrant collection cannot finalize them mid-call.
    pub pin_arguments: bool,
    /// Largest parameter count a bound callable may declare.
    pub max_params: usize,
}

impl BridgeConfig {
    pub const DEFAULT_MAX_PARAMS: usize = 16;

    pub fn with_host_number(mut self, host_number: HostNumber) -> Self {
        self.host_number = host_number;
        self
    }

    pub fn with_pin_arguments(mut self, pin: bool) -> Self {
        self.pin_arguments = pin;
        self
    }

    pub fn with_max_params(mut self, max_params: usize) -> Self {
        self.max_params = max_params;
        self
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host_number: HostNumber::DOUBLE,
            pin_arguments: true,
            max_params: Self::DEFAULT_MAX_PARAMS,
        }
    }
}
