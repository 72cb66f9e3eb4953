use serde::{Deserialize, Serialize};

/// One reachable service endpoint on a [`Network`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Connection {
    pub name: String,
    pub kind: String,
    pub port: u16,
}

impl Connection {
    pub fn new(name: &str, kind: &str, port: u16) -> Self {
        Self {
            name: name.to_owned(),
            kind: kind.to_owned(),
            port,
        }
    }
}

/// Addressing observed for a container.
///
/// Populated only from lease polls. The one local edit allowed is appending a
/// [`Connection`] that advertises a service opened on the guest.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Network {
    pub public_address: String,
    pub private_address: String,
    pub hardware_address: String,
    pub kind: String,
    pub hostname: String,
    pub tls: bool,
    pub dns: String,
    pub connections: Vec<Connection>,
}

impl Network {
    /// True when no lease has been observed.
    pub fn is_empty(&self) -> bool {
        self.private_address.is_empty()
            && self.public_address.is_empty()
            && self.hardware_address.is_empty()
            && self.hostname.is_empty()
    }

    pub fn add_connection(&mut self, connection: Connection) {
        self.connections.push(connection);
    }

    pub fn connection(&self, name: &str) -> Option<&Connection> {
        self.connections.iter().find(|c| c.name == name)
    }
}
