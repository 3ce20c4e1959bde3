//! # Field Maps
//!
//! Registry of field-mapping rules keyed by work item type name.
//!
//! ## Dispatch Order
//!
//! For an item of type `T`:
//! 1. every rule registered under [`WILDCARD_TYPE`], in registration order
//! 2. every rule registered under `T`, in registration order
//!
//! A missing list is skipped. Rule errors are returned unchanged; the
//! registry never catches or retries.

use crate::{FieldMapError, WILDCARD_TYPE, WorkItem};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

/// A single field transformation from a source item onto a target item.
///
/// The engine does not define what a rule does. Whether a rule fails loudly
/// or ignores bad input is the rule's own policy.
pub trait FieldMap: Send + Sync + Debug {
    /// Diagnostic name of the rule.
    fn name(&self) -> &str;

    /// Apply the transformation.
    fn execute(&self, source: &WorkItem, target: &mut WorkItem) -> Result<(), FieldMapError>;
}

/// Ordered field-mapping rules per type name.
///
/// Registration is additive: the same rule may be listed any number of
/// times, under the same or different keys, and runs once per listing.
#[derive(Debug, Default, Clone)]
pub struct FieldMapRegistry {
    maps: BTreeMap<String, Vec<Arc<dyn FieldMap>>>,
}

impl FieldMapRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `rule` to the list for `type_name`, creating the list if needed.
    pub fn add(&mut self, type_name: impl Into<String>, rule: Arc<dyn FieldMap>) {
        self.maps.entry(type_name.into()).or_default().push(rule);
    }

    /// Rules registered under exactly this key (no wildcard merging).
    #[must_use]
    pub fn rules_for(&self, type_name: &str) -> &[Arc<dyn FieldMap>] {
        self.maps.get(type_name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of distinct keys, wildcard included.
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.maps.len()
    }

    /// Total number of registered rule listings.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.maps.values().map(Vec::len).sum()
    }

    /// Check if no rule is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Rules that apply to `type_name`, wildcard list first.
    fn dispatch<'a>(&'a self, type_name: &str) -> impl Iterator<Item = &'a Arc<dyn FieldMap>> {
        self.rules_for(WILDCARD_TYPE)
            .iter()
            .chain(self.rules_for(type_name).iter())
    }

    /// Cross-store application, dispatched on the *source* item's type.
    pub fn apply(&self, source: &WorkItem, target: &mut WorkItem) -> Result<(), FieldMapError> {
        for rule in self.dispatch(source.type_name()) {
            rule.execute(source, target)?;
        }
        Ok(())
    }

    /// In-place application: the item is both source and target.
    ///
    /// Each rule sees the item as it stood right before that rule ran, so a
    /// rule observes the writes of every rule before it.
    pub fn apply_in_place(&self, item: &mut WorkItem) -> Result<(), FieldMapError> {
        let type_name = item.type_name().to_string();
        for rule in self.dispatch(&type_name) {
            let source = item.clone();
            rule.execute(&source, item)?;
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WorkItemId;

    /// Appends its label to the target's `trace` field.
    #[derive(Debug)]
    struct Trace(&'static str);

    impl FieldMap for Trace {
        fn name(&self) -> &str {
            self.0
        }

        fn execute(&self, _source: &WorkItem, target: &mut WorkItem) -> Result<(), FieldMapError> {
            let mut trace = target
                .field("trace")
                .map(|v| v.as_str().to_string())
                .unwrap_or_default();
            trace.push_str(self.0);
            target.set_field("trace", trace);
            Ok(())
        }
    }

    /// Copies the source's `trace` into `seen`.
    #[derive(Debug)]
    struct Observe;

    impl FieldMap for Observe {
        fn name(&self) -> &str {
            "observe"
        }

        fn execute(&self, source: &WorkItem, target: &mut WorkItem) -> Result<(), FieldMapError> {
            let seen = source
                .field("trace")
                .map(|v| v.as_str().to_string())
                .unwrap_or_default();
            target.set_field("seen", seen);
            Ok(())
        }
    }

    fn trace_of(item: &WorkItem) -> &str {
        item.field("trace").map(|v| v.as_str()).unwrap_or("")
    }

    #[test]
    fn wildcard_rules_run_before_type_rules() {
        let mut registry = FieldMapRegistry::new();
        registry.add("*", Arc::new(Trace("1")));
        registry.add("Bug", Arc::new(Trace("2")));
        registry.add("*", Arc::new(Trace("3")));

        let source = WorkItem::new(WorkItemId(1), "Bug");
        let mut target = WorkItem::new(WorkItemId(2), "Defect");
        registry.apply(&source, &mut target).expect("apply");

        assert_eq!(trace_of(&target), "132");
    }

    #[test]
    fn dispatch_uses_source_type() {
        let mut registry = FieldMapRegistry::new();
        registry.add("Defect", Arc::new(Trace("d")));
        registry.add("Bug", Arc::new(Trace("b")));

        let source = WorkItem::new(WorkItemId(1), "Bug");
        let mut target = WorkItem::new(WorkItemId(2), "Defect");
        registry.apply(&source, &mut target).expect("apply");

        assert_eq!(trace_of(&target), "b");
    }

    #[test]
    fn missing_lists_are_skipped() {
        let registry = FieldMapRegistry::new();
        let source = WorkItem::new(WorkItemId(1), "Bug");
        let mut target = source.clone();
        registry.apply(&source, &mut target).expect("apply");
        assert_eq!(target, source);
    }

    #[test]
    fn same_rule_listed_twice_runs_twice() {
        let rule: Arc<dyn FieldMap> = Arc::new(Trace("x"));
        let mut registry = FieldMapRegistry::new();
        registry.add("Task", Arc::clone(&rule));
        registry.add("Task", rule);

        let mut item = WorkItem::new(WorkItemId(1), "Task");
        registry.apply_in_place(&mut item).expect("apply");

        assert_eq!(trace_of(&item), "xx");
        assert_eq!(registry.rule_count(), 2);
        assert_eq!(registry.type_count(), 1);
    }

    #[test]
    fn in_place_rules_see_earlier_writes() {
        let mut registry = FieldMapRegistry::new();
        registry.add("*", Arc::new(Trace("a")));
        registry.add("Bug", Arc::new(Observe));

        let mut item = WorkItem::new(WorkItemId(1), "Bug");
        registry.apply_in_place(&mut item).expect("apply");

        assert_eq!(item.field("seen").map(|v| v.as_str()), Some("a"));
    }

    #[test]
    fn rules_for_preserves_call_order() {
        let mut registry = FieldMapRegistry::new();
        registry.add("Bug", Arc::new(Trace("1")));
        registry.add("Bug", Arc::new(Trace("2")));
        registry.add("Bug", Arc::new(Trace("3")));

        let names: Vec<_> = registry.rules_for("Bug").iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["1", "2", "3"]);
        assert!(registry.rules_for("Task").is_empty());
    }
}
