use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::GroupId;

/// Named, ordered collection of channel addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub sort_order: i64,
    #[serde(default)]
    pub channels: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn new(name: impl Into<String>, sort_order: i64) -> Self {
        Self {
            id: GroupId::new(),
            name: name.into(),
            sort_order,
            channels: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn contains(&self, address: &str) -> bool {
        self.channels.iter().any(|a| a == address)
    }

    /// Appends addresses not already present. Returns how many were added.
    pub fn add_channels<'a, I>(&mut self, addresses: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut added = 0;
        for address in addresses {
            if !self.contains(address) {
                self.channels.push(address.to_string());
                added += 1;
            }
        }
        added
    }

    pub fn remove_channels<'a, I>(&mut self, addresses: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let before = self.channels.len();
        let drop: Vec<&str> = addresses.into_iter().collect();
        self.channels.retain(|a| !drop.contains(&a.as_str()));
        before - self.channels.len()
    }
}
