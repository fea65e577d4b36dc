//! Keeping recorded annotation values in line with schema edits.
//!
//! Three steps, all pure and in memory:
//!
//! 1. [`compute_change_set`] diffs the previous and the submitted schema.
//! 2. [`apply_change_set`] rewrites every stored record accordingly.
//! 3. [`merge_annotations`] upserts a value edit into the store.
//!
//! Records are keyed by field label and hold option labels, so a renamed
//! field or option rewrites keys and values across the whole store.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;

use crate::annotation_schema::Schema;
use crate::annotation_values::{
    AnnotationRecord, AnnotationStore, AnnotationValue, IncomingAnnotations,
};

// ---------------------------------------------------------------------------
// Change set
// ---------------------------------------------------------------------------

/// Structural delta between two schema versions, expressed in labels.
///
/// The option sets are shared by all option-bearing fields; an option label
/// listed here applies to every field in `option_bearing_labels`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    /// Old labels of fields that were removed or retyped incompatibly.
    pub fields_to_delete: BTreeSet<String>,
    /// Old field label -> new field label.
    pub label_renames: BTreeMap<String, String>,
    pub option_labels_to_delete: BTreeSet<String>,
    /// Old option label -> new option label.
    pub option_label_renames: BTreeMap<String, String>,
    /// Post-rename labels of dropdown/checkbox fields whose values must be
    /// checked against the option sets.
    pub option_bearing_labels: BTreeSet<String>,
}

impl ChangeSet {
    /// `true` when applying the set cannot change any record.
    pub fn is_empty(&self) -> bool {
        self.fields_to_delete.is_empty()
            && self.label_renames.is_empty()
            && self.option_labels_to_delete.is_empty()
            && self.option_label_renames.is_empty()
    }

    pub fn summary(&self) -> ChangeSummary {
        ChangeSummary {
            fields_deleted: self.fields_to_delete.len(),
            labels_renamed: self.label_renames.len(),
            options_deleted: self.option_labels_to_delete.len(),
            options_renamed: self.option_label_renames.len(),
        }
    }
}

/// Sizes of a [`ChangeSet`], for logs and API responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    pub fields_deleted: usize,
    pub labels_renamed: usize,
    pub options_deleted: usize,
    pub options_renamed: usize,
}

// ---------------------------------------------------------------------------
// Delta computation
// ---------------------------------------------------------------------------

/// Diff `old` against `new` field by field id.
///
/// - A field missing from `new` is deleted.
/// - A type change is a deletion unless both types are text-like.
/// - A changed label is a rename.
/// - For dropdown/checkbox fields that had options, options missing by id
///   are deleted and options with a changed label are renamed.
///
/// A deleted field never contributes option entries.
pub fn compute_change_set(old: &Schema, new: &Schema) -> ChangeSet {
    let mut cs = ChangeSet::default();

    for (field_id, old_field) in old.iter() {
        let Some(new_field) = new.get(field_id) else {
            cs.fields_to_delete.insert(old_field.label.clone());
            continue;
        };

        if old_field.field_type != new_field.field_type
            && !(old_field.field_type.is_text_like() && new_field.field_type.is_text_like())
        {
            cs.fields_to_delete.insert(old_field.label.clone());
            continue;
        }

        if old_field.label != new_field.label {
            cs.label_renames
                .insert(old_field.label.clone(), new_field.label.clone());
        }

        if !new_field.field_type.is_option_bearing() {
            continue;
        }
        let Some(old_options) = old_field.options.as_deref() else {
            continue;
        };

        cs.option_bearing_labels.insert(new_field.label.clone());

        let new_option_ids: HashSet<&str> = new_field
            .options
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|o| o.id.as_str())
            .collect();

        for option in old_options {
            if !new_option_ids.contains(option.id.as_str()) {
                cs.option_labels_to_delete.insert(option.label.clone());
                continue;
            }
            if let Some(renamed) = new_field.option_by_id(&option.id) {
                if renamed.label != option.label {
                    cs.option_label_renames
                        .insert(option.label.clone(), renamed.label.clone());
                }
            }
        }
    }

    cs
}

// ---------------------------------------------------------------------------
// Migration
// ---------------------------------------------------------------------------

/// Rewrite every record of `store` according to `cs`.
///
/// Entries of deleted fields are dropped, renamed fields move to their new
/// label (keeping their position in the record), option values are pruned
/// or relabelled, and items left without any value are removed.
///
/// If two entries end up under the same label, the later one wins.
pub fn apply_change_set(store: AnnotationStore, cs: &ChangeSet) -> AnnotationStore {
    if cs.is_empty() {
        return store;
    }

    let items = store
        .into_items()
        .into_iter()
        .map(|(item_id, record)| (item_id, migrate_record(record, cs)))
        .collect();

    let mut migrated = AnnotationStore::from_items(items);
    migrated.prune_empty();
    migrated
}

fn migrate_record(record: AnnotationRecord, cs: &ChangeSet) -> AnnotationRecord {
    let mut migrated = AnnotationRecord::with_capacity(record.len());

    for (label, value) in record {
        if cs.fields_to_delete.contains(&label) {
            continue;
        }

        let label = match cs.label_renames.get(&label) {
            Some(renamed) => renamed.clone(),
            None => label,
        };

        let value = if cs.option_bearing_labels.contains(&label) {
            match migrate_option_value(value, cs) {
                Some(value) => value,
                None => continue,
            }
        } else {
            value
        };

        migrated.insert(label, value);
    }

    migrated
}

/// `None` means the entry must be removed.
fn migrate_option_value(value: AnnotationValue, cs: &ChangeSet) -> Option<AnnotationValue> {
    match value {
        AnnotationValue::Single(choice) => {
            if cs.option_labels_to_delete.contains(&choice) {
                return None;
            }
            let choice = cs.option_label_renames.get(&choice).cloned().unwrap_or(choice);
            Some(AnnotationValue::Single(choice))
        }
        AnnotationValue::Multiple(choices) => Some(AnnotationValue::Multiple(
            choices
                .into_iter()
                .filter(|c| !cs.option_labels_to_delete.contains(c))
                .map(|c| cs.option_label_renames.get(&c).cloned().unwrap_or(c))
                .collect(),
        )),
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Upsert a value edit into `store`.
///
/// The incoming record of an item replaces the stored one wholesale; an
/// empty incoming record removes the item. Items not mentioned are left
/// alone. Values are not checked against the schema.
pub fn merge_annotations(
    mut store: AnnotationStore,
    incoming: IncomingAnnotations,
) -> AnnotationStore {
    for (item_id, record) in incoming {
        if record.is_empty() {
            store.remove(&item_id);
        } else {
            store.upsert(item_id, record);
        }
    }
    store
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation_schema::{AnnotationField, FieldType};
    use serde_json::json;

    fn schema(value: serde_json::Value) -> Schema {
        serde_json::from_value(value).unwrap()
    }

    fn store(value: serde_json::Value) -> AnnotationStore {
        serde_json::from_value(value).unwrap()
    }

    fn incoming(value: serde_json::Value) -> IncomingAnnotations {
        serde_json::from_value(value).unwrap()
    }

    fn to_json(store: &AnnotationStore) -> serde_json::Value {
        serde_json::to_value(store).unwrap()
    }

    fn topic_schema(label: &str, options: serde_json::Value) -> Schema {
        schema(json!({"f1": {"label": label, "type": "dropdown", "options": options}}))
    }

    // -- compute_change_set ------------------------------------------------

    #[test]
    fn identical_schemas_produce_no_changes() {
        let s = topic_schema("Topic", json!([{"o1": "Politics"}, {"o2": "Sports"}]));
        let cs = compute_change_set(&s, &s.clone());
        assert!(cs.is_empty());
        assert_eq!(cs.option_bearing_labels, BTreeSet::from(["Topic".to_string()]));
    }

    #[test]
    fn removed_field_is_deleted_by_old_label() {
        let old = schema(json!({
            "f1": {"label": "Notes", "type": "text"},
            "f2": {"label": "Keep", "type": "text"}
        }));
        let new = schema(json!({"f2": {"label": "Keep", "type": "text"}}));
        let cs = compute_change_set(&old, &new);
        assert_eq!(cs.fields_to_delete, BTreeSet::from(["Notes".to_string()]));
        assert!(cs.label_renames.is_empty());
    }

    #[test]
    fn removed_option_field_produces_no_option_entries() {
        let old = topic_schema("Topic", json!([{"o1": "Politics"}]));
        let cs = compute_change_set(&old, &Schema::new());
        assert_eq!(cs.fields_to_delete.len(), 1);
        assert!(cs.option_labels_to_delete.is_empty());
        assert!(cs.option_bearing_labels.is_empty());
    }

    #[test]
    fn retype_between_text_kinds_is_not_a_deletion() {
        let old = schema(json!({"f1": {"label": "Notes", "type": "text"}}));
        let new = schema(json!({"f1": {"label": "Notes", "type": "textarea"}}));
        assert!(compute_change_set(&old, &new).is_empty());
    }

    #[test]
    fn retype_across_kinds_deletes_even_when_renamed() {
        let old = schema(json!({"f1": {"label": "Notes", "type": "text"}}));
        let new = schema(json!({"f1": {"label": "Topic", "type": "dropdown",
                                      "options": [{"o1": "A"}]}}));
        let cs = compute_change_set(&old, &new);
        assert_eq!(cs.fields_to_delete, BTreeSet::from(["Notes".to_string()]));
        assert!(cs.label_renames.is_empty());
        assert!(cs.option_bearing_labels.is_empty());
    }

    #[test]
    fn dropdown_to_checkbox_is_a_deletion() {
        let old = topic_schema("Topic", json!([{"o1": "A"}]));
        let new = schema(json!({"f1": {"label": "Topic", "type": "checkbox",
                                      "options": [{"o1": "A"}]}}));
        let cs = compute_change_set(&old, &new);
        assert!(cs.fields_to_delete.contains("Topic"));
    }

    #[test]
    fn option_changes_are_tracked_by_id() {
        let old = topic_schema(
            "Topic",
            json!([{"o1": "Politics"}, {"o2": "Sports"}, {"o3": "Misc"}]),
        );
        let new = topic_schema(
            "Subject",
            json!([{"o1": "Politics"}, {"o3": "Other"}, {"o4": "New"}]),
        );
        let cs = compute_change_set(&old, &new);

        assert_eq!(
            cs.label_renames,
            BTreeMap::from([("Topic".to_string(), "Subject".to_string())])
        );
        assert_eq!(cs.option_bearing_labels, BTreeSet::from(["Subject".to_string()]));
        assert_eq!(cs.option_labels_to_delete, BTreeSet::from(["Sports".to_string()]));
        assert_eq!(
            cs.option_label_renames,
            BTreeMap::from([("Misc".to_string(), "Other".to_string())])
        );
    }

    #[test]
    fn new_field_without_old_options_is_not_option_bearing() {
        let old = schema(json!({"f1": {"label": "Topic", "type": "dropdown"}}));
        let new = topic_schema("Topic", json!([{"o1": "A"}]));
        let cs = compute_change_set(&old, &new);
        assert!(cs.option_bearing_labels.is_empty());
    }

    #[test]
    fn new_options_missing_deletes_every_old_option() {
        let old = topic_schema("Topic", json!([{"o1": "A"}, {"o2": "B"}]));
        let new = schema(json!({"f1": {"label": "Topic", "type": "dropdown"}}));
        let cs = compute_change_set(&old, &new);
        assert_eq!(
            cs.option_labels_to_delete,
            BTreeSet::from(["A".to_string(), "B".to_string()])
        );
    }

    #[test]
    fn added_fields_are_ignored() {
        let old = schema(json!({"f1": {"label": "Notes", "type": "text"}}));
        let new = schema(json!({
            "f1": {"label": "Notes", "type": "text"},
            "f2": {"label": "Extra", "type": "checkbox", "options": [{"o1": "x"}]}
        }));
        let cs = compute_change_set(&old, &new);
        assert!(cs.is_empty());
        assert!(cs.option_bearing_labels.is_empty());
    }

    #[test]
    fn unknown_kinds_compare_by_name() {
        let old =
            Schema::new().with_field("f1", AnnotationField::new("Q", FieldType::parse("rating")));
        let same = old.clone();
        let other =
            Schema::new().with_field("f1", AnnotationField::new("Q", FieldType::parse("slider")));
        assert!(compute_change_set(&old, &same).is_empty());
        assert!(compute_change_set(&old, &other).fields_to_delete.contains("Q"));
    }

    // -- apply_change_set ----------------------------------------------------

    #[test]
    fn empty_change_set_leaves_store_byte_for_byte() {
        let s = topic_schema("Topic", json!([{"o1": "Politics"}]));
        let original = store(json!({
            "p1": {"Topic": "Politics", "Notes": ""},
            "p2": {"Topic": "Gone"}
        }));
        let before = original.encode().unwrap();

        let cs = compute_change_set(&s, &s);
        let after = apply_change_set(original, &cs);

        assert_eq!(after.encode().unwrap(), before);
    }

    #[test]
    fn deleted_field_disappears_from_every_record() {
        let old = schema(json!({
            "f1": {"label": "Notes", "type": "text"},
            "f2": {"label": "Score", "type": "text"}
        }));
        let new = schema(json!({"f2": {"label": "Score", "type": "text"}}));
        let s = store(json!({
            "p1": {"Notes": "a", "Score": "1"},
            "p2": {"Notes": "b"}
        }));

        let out = apply_change_set(s, &compute_change_set(&old, &new));

        assert_eq!(to_json(&out), json!({"p1": {"Score": "1"}}));
    }

    #[test]
    fn rename_moves_value_and_keeps_position() {
        let old = schema(json!({
            "f1": {"label": "A", "type": "text"},
            "f2": {"label": "B", "type": "text"}
        }));
        let new = schema(json!({
            "f1": {"label": "Renamed", "type": "text"},
            "f2": {"label": "B", "type": "text"}
        }));
        let s = store(json!({"p1": {"A": "one", "B": "two"}}));

        let out = apply_change_set(s, &compute_change_set(&old, &new));

        let record = out.get("p1").unwrap();
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["Renamed", "B"]);
        assert_eq!(record["Renamed"], AnnotationValue::single("one"));
    }

    #[test]
    fn swapped_labels_do_not_clobber_each_other() {
        let old = schema(json!({
            "f1": {"label": "A", "type": "text"},
            "f2": {"label": "B", "type": "text"}
        }));
        let new = schema(json!({
            "f1": {"label": "B", "type": "text"},
            "f2": {"label": "A", "type": "text"}
        }));
        let s = store(json!({"p1": {"A": "from f1", "B": "from f2"}}));

        let out = apply_change_set(s, &compute_change_set(&old, &new));

        assert_eq!(to_json(&out), json!({"p1": {"B": "from f1", "A": "from f2"}}));
    }

    #[test]
    fn checkbox_filtering_preserves_order_and_duplicates() {
        let old = schema(json!({"f1": {"label": "Tags", "type": "checkbox",
            "options": [{"o1": "a"}, {"o2": "b"}, {"o3": "c"}]}}));
        let new = schema(json!({"f1": {"label": "Tags", "type": "checkbox",
            "options": [{"o1": "a"}, {"o3": "z"}]}}));
        let s = store(json!({
            "p1": {"Tags": ["a", "b", "c"]},
            "p2": {"Tags": ["c", "a", "c"]}
        }));

        let out = apply_change_set(s, &compute_change_set(&old, &new));

        assert_eq!(out.get("p1").unwrap()["Tags"], AnnotationValue::multiple(["a", "z"]));
        assert_eq!(out.get("p2").unwrap()["Tags"], AnnotationValue::multiple(["z", "a", "z"]));
    }

    #[test]
    fn checkbox_emptied_by_deletion_keeps_empty_list() {
        let old = schema(json!({"f1": {"label": "Tags", "type": "checkbox",
            "options": [{"o1": "a"}, {"o2": "b"}]}}));
        let new = schema(json!({"f1": {"label": "Tags", "type": "checkbox",
            "options": [{"o1": "a"}]}}));
        let s = store(json!({"p1": {"Tags": ["b"]}}));

        let out = apply_change_set(s, &compute_change_set(&old, &new));

        assert_eq!(to_json(&out), json!({"p1": {"Tags": []}}));
    }

    #[test]
    fn text_to_textarea_keeps_value() {
        let old = schema(json!({"f1": {"label": "Notes", "type": "text"}}));
        let new = schema(json!({"f1": {"label": "Notes", "type": "textarea"}}));
        let s = store(json!({"p1": {"Notes": "keep me"}}));

        let out = apply_change_set(s, &compute_change_set(&old, &new));

        assert_eq!(out.get("p1").unwrap()["Notes"], AnnotationValue::single("keep me"));
    }

    #[test]
    fn text_values_are_not_touched_by_option_changes() {
        let old = schema(json!({
            "f1": {"label": "Topic", "type": "dropdown", "options": [{"o1": "Sports"}]},
            "f2": {"label": "Notes", "type": "text"}
        }));
        let new = schema(json!({
            "f1": {"label": "Topic", "type": "dropdown", "options": []},
            "f2": {"label": "Notes", "type": "text"}
        }));
        let s = store(json!({"p1": {"Topic": "Sports", "Notes": "Sports"}}));

        let out = apply_change_set(s, &compute_change_set(&old, &new));

        assert_eq!(to_json(&out), json!({"p1": {"Notes": "Sports"}}));
    }

    #[test]
    fn dropdown_rename_and_delete_scenario() {
        let old = topic_schema("Topic", json!([{"o1": "Politics"}, {"o2": "Sports"}]));
        let new = topic_schema("Subject", json!([{"o1": "Politics"}, {"o3": "Culture"}]));
        let s = store(json!({
            "p1": {"Topic": "Sports"},
            "p2": {"Topic": "Politics"}
        }));

        let out = apply_change_set(s, &compute_change_set(&old, &new));

        assert!(!out.contains("p1"));
        assert_eq!(to_json(&out), json!({"p2": {"Subject": "Politics"}}));
    }

    #[test]
    fn renamed_option_value_is_relabelled() {
        let old = topic_schema("Topic", json!([{"o1": "Sport"}]));
        let new = topic_schema("Topic", json!([{"o1": "Sports"}]));
        let s = store(json!({"p1": {"Topic": "Sport"}}));

        let out = apply_change_set(s, &compute_change_set(&old, &new));

        assert_eq!(to_json(&out), json!({"p1": {"Topic": "Sports"}}));
    }

    #[test]
    fn unknown_labels_are_left_alone() {
        let old = schema(json!({"f1": {"label": "Notes", "type": "text"}}));
        let s = store(json!({"p1": {"Notes": "x", "Stray": "y"}}));

        let out = apply_change_set(s, &compute_change_set(&old, &Schema::new()));

        assert_eq!(to_json(&out), json!({"p1": {"Stray": "y"}}));
    }

    // -- merge_annotations -------------------------------------------------

    #[test]
    fn merge_empty_record_removes_item() {
        let s = store(json!({"item1": {"Q1": "yes"}}));
        let out = merge_annotations(s, incoming(json!({"item1": {}})));
        assert!(out.is_empty());
    }

    #[test]
    fn merge_into_empty_store_inserts() {
        let out = merge_annotations(
            AnnotationStore::new(),
            incoming(json!({"item1": {"Q1": "no"}})),
        );
        assert_eq!(to_json(&out), json!({"item1": {"Q1": "no"}}));
    }

    #[test]
    fn merge_replaces_record_wholesale() {
        let s = store(json!({"item1": {"Q1": "yes", "Q2": ["a"]}}));
        let out = merge_annotations(s, incoming(json!({"item1": {"Q2": ["b"]}})));
        assert_eq!(to_json(&out), json!({"item1": {"Q2": ["b"]}}));
    }

    #[test]
    fn merge_leaves_unmentioned_items() {
        let s = store(json!({"item1": {"Q1": "yes"}, "item2": {"Q1": "no"}}));
        let out = merge_annotations(s, incoming(json!({"item3": {"Q1": "maybe"}})));
        assert_eq!(
            to_json(&out),
            json!({"item1": {"Q1": "yes"}, "item2": {"Q1": "no"}, "item3": {"Q1": "maybe"}})
        );
    }

    #[test]
    fn merge_removing_unknown_item_is_a_no_op() {
        let s = store(json!({"item1": {"Q1": "yes"}}));
        let out = merge_annotations(s, incoming(json!({"ghost": {}})));
        assert_eq!(to_json(&out), json!({"item1": {"Q1": "yes"}}));
    }
}
