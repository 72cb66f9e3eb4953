use crate::container::Container;
use crate::image::Image;
use crate::network::Network;
use serde::{Deserialize, Serialize};

/// A named deployment of containers.
///
/// `containers` and `images` cache the last scan; they are replaced wholesale
/// on every refresh and are never authoritative.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cluster {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub reverse_proxy: String,
    #[serde(default)]
    pub load_balancer: String,
    #[serde(default)]
    pub controller: String,
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub network: Network,
}

impl Cluster {
    pub fn new(name: &str, kind: &str) -> Self {
        Self {
            name: name.to_owned(),
            kind: kind.to_owned(),
            ..Self::default()
        }
    }

    pub fn container(&self, name: &str) -> Option<&Container> {
        self.containers.iter().find(|c| c.name == name)
    }

    pub fn container_mut(&mut self, name: &str) -> Option<&mut Container> {
        self.containers.iter_mut().find(|c| c.name == name)
    }

    pub fn image(&self, name: &str) -> Option<&Image> {
        self.images.iter().find(|i| i.name == name)
    }

    pub fn container_names(&self) -> Vec<&str> {
        self.containers.iter().map(|c| c.name.as_str()).collect()
    }
}
