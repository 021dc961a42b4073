//! Key and channel naming.
//!
//! The layout is shared by every fleet member in a namespace and must stay
//! stable for members built from different versions to interoperate:
//!
//! ```text
//! breaker:<ns>                                   announce channel
//! breaker:<ns>:lock                              tick lock
//! breaker:<ns>:circuits                          set of circuit names
//! breaker:<ns>:circuit:<name>                    circuit hash + state channel
//! breaker:<ns>:circuit:<name>:bucket:<baseTime>  bucket hash
//! breaker:<ns>:circuit:<name>:ticker             last shared tick
//! ```

const PREFIX: &str = "breaker";

/// Key builder for one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyspace {
    namespace: String,
}

impl Keyspace {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Channel carrying circuit-name announcements.
    pub fn announce_channel(&self) -> String {
        format!("{}:{}", PREFIX, self.namespace)
    }

    /// Pattern covering the announce channel and every circuit channel.
    pub fn subscription_pattern(&self) -> String {
        format!("{}:{}*", PREFIX, self.namespace)
    }

    pub fn lock(&self) -> String {
        format!("{}:{}:lock", PREFIX, self.namespace)
    }

    pub fn circuit_set(&self) -> String {
        format!("{}:{}:circuits", PREFIX, self.namespace)
    }

    /// Persisted hash of a circuit; also the name of its state channel.
    pub fn circuit(&self, name: &str) -> String {
        format!("{}{}", self.circuit_prefix(), name)
    }

    pub fn bucket(&self, name: &str, base_time: u64) -> String {
        format!("{}:bucket:{}", self.circuit(name), base_time)
    }

    pub fn ticker(&self, name: &str) -> String {
        format!("{}:ticker", self.circuit(name))
    }

    fn circuit_prefix(&self) -> String {
        format!("{}:{}:circuit:", PREFIX, self.namespace)
    }

    /// Circuit name for a circuit state channel, `None` for any other channel.
    pub fn circuit_from_channel<'a>(&self, channel: &'a str) -> Option<&'a str> {
        let name = channel.strip_prefix(self.circuit_prefix().as_str())?;
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }
}
