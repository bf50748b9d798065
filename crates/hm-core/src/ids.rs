//! Strongly-typed metadata identifiers.

use crate::newtype_string::define_id;

define_id! {
    /// Caller-assigned hierarchy node id, unique within a project.
    pub struct HierarchyId;
}

define_id! {
    /// Formula group id, referenced from nodes through `formula_group_ref`.
    pub struct FormulaGroupId;
}

define_id! {
    /// Filter group id, referenced from nodes through `filter_group_ref`.
    pub struct FilterGroupId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_ids_rejected() {
        assert!(HierarchyId::try_new("").is_none());
        assert!(HierarchyId::try_new("   ").is_none());
        assert!(FilterGroupId::try_from(" ").is_err());
    }

    #[test]
    fn test_id_ordering_is_lexicographic() {
        let mut ids = vec![HierarchyId::new("B"), HierarchyId::new("A10"), HierarchyId::new("A2")];
        ids.sort();
        assert_eq!(ids, vec!["A10", "A2", "B"]);
    }

    #[test]
    fn test_id_serde_transparent() {
        let id = FormulaGroupId::new("GROSS_PROFIT");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, r#""GROSS_PROFIT""#);
        let back: FormulaGroupId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<FormulaGroupId>(r#""""#).is_err());
    }

    #[test]
    fn test_id_borrow_lookup() {
        use std::collections::HashMap;
        let mut map: HashMap<HierarchyId, i32> = HashMap::new();
        map.insert(HierarchyId::new("REV"), 1);
        assert_eq!(map.get("REV"), Some(&1));
    }
}
