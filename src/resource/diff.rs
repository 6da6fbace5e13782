//! Desired vs. actual comparison

use super::schema::{Behavior, KeyedItem, ResourceDef};
use serde_json::Value;
use std::collections::BTreeMap;

/// A field whose value differs between the old and new spec
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub name: &'static str,
    pub wire: &'static str,
    /// `None` when the field is being cleared
    pub value: Option<Value>,
}

/// Updatable fields that differ, in field table order
///
/// Computed fields and keyed collections are skipped. An OptionalComputed
/// field left unset in `new` keeps the server's value. Fails with the name of
/// the first Required or ForceNew field that changed.
pub fn diff_fields<S: 'static>(
    def: &ResourceDef<S>,
    old: &S,
    new: &S,
) -> Result<Vec<FieldChange>, &'static str> {
    let mut changes = Vec::new();

    for field in def.fields.iter().filter(|f| f.is_input()) {
        if def.is_collection(field.name) {
            continue;
        }

        let new_value = (field.get)(new);
        if new_value.is_none() && field.behavior == Behavior::OptionalComputed {
            continue;
        }
        if new_value == (field.get)(old) {
            continue;
        }
        if field.force_new || field.behavior == Behavior::Required {
            return Err(field.name);
        }

        if let Some(wire) = field.wire {
            changes.push(FieldChange {
                name: field.name,
                wire,
                value: new_value,
            });
        }
    }

    Ok(changes)
}

/// One mutation of a keyed collection
#[derive(Debug, Clone, PartialEq)]
pub enum ItemChange {
    Add(KeyedItem),
    Patch(KeyedItem),
    Remove(String),
}

impl ItemChange {
    pub fn key(&self) -> &str {
        match self {
            Self::Add(item) | Self::Patch(item) => &item.key,
            Self::Remove(key) => key,
        }
    }
}

/// Diff two collections by key
///
/// Keys only in `new` are added, keys in both with different content are
/// patched, keys only in `old` are removed. Additions and patches come first,
/// in `new` order, then removals.
pub fn diff_keyed(old: &[KeyedItem], new: &[KeyedItem]) -> Vec<ItemChange> {
    let old_by_key: BTreeMap<&str, &Value> =
        old.iter().map(|i| (i.key.as_str(), &i.body)).collect();
    let new_keys: BTreeMap<&str, ()> = new.iter().map(|i| (i.key.as_str(), ())).collect();

    let mut changes = Vec::new();
    for item in new {
        match old_by_key.get(item.key.as_str()) {
            None => changes.push(ItemChange::Add(item.clone())),
            Some(body) if **body != item.body => changes.push(ItemChange::Patch(item.clone())),
            Some(_) => {},
        }
    }

    for item in old {
        if !new_keys.contains_key(item.key.as_str()) {
            changes.push(ItemChange::Remove(item.key.clone()));
        }
    }

    changes
}
