use sniffer_model::{Group, GroupId};
use tracing::info;

use super::ChannelLibrary;
use crate::error::{Result, SnifferError};

fn group_not_found(id: GroupId) -> SnifferError {
    SnifferError::not_found(format!("group {id}"))
}

impl ChannelLibrary {
    /// Groups ordered by `sort_order`, then creation.
    pub fn snapshot_groups(&self) -> Vec<Group> {
        let mut groups: Vec<Group> = self.groups.read().values().cloned().collect();
        groups.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        groups
    }

    pub fn group(&self, id: GroupId) -> Option<Group> {
        self.groups.read().get(&id).cloned()
    }

    pub fn create_group(&self, name: &str) -> Result<Group> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SnifferError::invalid("group name required"));
        }

        let mut guard = self.groups.write();
        let next = guard.values().map(|g| g.sort_order).max().unwrap_or(0) + 1;
        let group = Group::new(name, next);
        guard.insert(group.id, group.clone());
        info!(group_id = %group.id, name, sort_order = next, "created group");
        Ok(group)
    }

    pub fn rename_group(&self, id: GroupId, name: &str) -> Result<Group> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SnifferError::invalid("new name required"));
        }
        let mut guard = self.groups.write();
        let group = guard.get_mut(&id).ok_or_else(|| group_not_found(id))?;
        group.name = name.to_string();
        Ok(group.clone())
    }

    pub fn delete_group(&self, id: GroupId) -> Result<Group> {
        self.groups
            .write()
            .remove(&id)
            .ok_or_else(|| group_not_found(id))
    }

    /// Assigns 1-based sort orders by list position. Unknown ids are skipped.
    pub fn reorder_groups(&self, order: &[GroupId]) -> Result<usize> {
        if order.is_empty() {
            return Err(SnifferError::invalid("order list required"));
        }
        let mut guard = self.groups.write();
        let mut updated = 0;
        for (index, id) in order.iter().enumerate() {
            if let Some(group) = guard.get_mut(id) {
                group.sort_order = index as i64 + 1;
                updated += 1;
            }
        }
        Ok(updated)
    }

    pub fn add_to_group(&self, id: GroupId, addresses: &[String]) -> Result<usize> {
        if addresses.is_empty() {
            return Err(SnifferError::invalid("no channels provided"));
        }
        let mut guard = self.groups.write();
        let group = guard.get_mut(&id).ok_or_else(|| group_not_found(id))?;
        Ok(group.add_channels(addresses.iter().map(String::as_str)))
    }

    pub fn remove_from_group(
        &self,
        id: GroupId,
        addresses: &[String],
    ) -> Result<usize> {
        if addresses.is_empty() {
            return Err(SnifferError::invalid("no channels provided"));
        }
        let mut guard = self.groups.write();
        let group = guard.get_mut(&id).ok_or_else(|| group_not_found(id))?;
        Ok(group.remove_channels(addresses.iter().map(String::as_str)))
    }

    /// Finds a group by exact name, creating it at the end of the ordering
    /// when missing. The flag reports whether a group was created.
    pub fn ensure_group(&self, name: &str) -> (GroupId, bool) {
        let mut guard = self.groups.write();
        if let Some(existing) = guard.values().find(|g| g.name == name) {
            return (existing.id, false);
        }
        let next = guard.values().map(|g| g.sort_order).max().unwrap_or(0) + 1;
        let group = Group::new(name, next);
        let id = group.id;
        guard.insert(id, group);
        (id, true)
    }

    /// Makes `id` the only group containing `address`.
    pub fn move_to_group(&self, address: &str, id: GroupId) -> Result<()> {
        let mut guard = self.groups.write();
        if !guard.contains_key(&id) {
            return Err(group_not_found(id));
        }
        for (group_id, group) in guard.iter_mut() {
            if *group_id == id {
                group.add_channels([address]);
            } else {
                group.remove_channels([address]);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_appends_to_ordering_and_reorder_is_one_based() {
        let library = ChannelLibrary::new();
        let news = library.create_group("News").expect("news");
        let sports = library.create_group("Sports").expect("sports");
        assert_eq!(news.sort_order, 1);
        assert_eq!(sports.sort_order, 2);

        assert_eq!(library.reorder_groups(&[sports.id, news.id, GroupId::new()]).expect("reorder"), 2);
        let ordered: Vec<String> = library.snapshot_groups().into_iter().map(|g| g.name).collect();
        assert_eq!(ordered, vec!["Sports", "News"]);
        assert!(library.create_group("  ").is_err());
    }

    #[test]
    fn move_to_group_leaves_single_membership() {
        let library = ChannelLibrary::new();
        let a = library.create_group("A").expect("a");
        let b = library.create_group("B").expect("b");
        library
            .add_to_group(a.id, &["10.0.0.1".to_string()])
            .expect("add");

        library.move_to_group("10.0.0.1", b.id).expect("move");
        assert!(!library.group(a.id).expect("a").contains("10.0.0.1"));
        assert!(library.group(b.id).expect("b").contains("10.0.0.1"));
    }

    #[test]
    fn ensure_group_reuses_existing_name() {
        let library = ChannelLibrary::new();
        let (first, created) = library.ensure_group("Movies");
        assert!(created);
        let (second, created) = library.ensure_group("Movies");
        assert!(!created);
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_group_operations_are_not_found() {
        let library = ChannelLibrary::new();
        let missing = GroupId::new();
        assert!(matches!(library.delete_group(missing), Err(SnifferError::NotFound(_))));
        assert!(matches!(library.rename_group(missing, "x"), Err(SnifferError::NotFound(_))));
        assert!(matches!(
            library.add_to_group(missing, &["10.0.0.1".to_string()]),
            Err(SnifferError::NotFound(_))
        ));
    }
}
