//! Post-fetch shaping of observations: extraction, augmentation and aliasing

use crate::models::{DisplayColumn, Observation, Record, Value};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Derives extra fields from an observation; the output is merged back in
pub type AugmentFn = Arc<dyn Fn(&Observation) -> Observation + Send + Sync>;

/// Source key to destination key
pub type AliasMap = BTreeMap<String, String>;

/// Pull the display columns out of a record; absent fields become `Null`
pub(crate) fn extract(record: Option<&Record>, columns: &[DisplayColumn]) -> Observation {
    columns
        .iter()
        .map(|column| {
            let value = record
                .and_then(|r| r.get(&column.accessor))
                .cloned()
                .map(|v| v.into_value())
                .unwrap_or(Value::Null);
            (column.accessor.clone(), value)
        })
        .collect()
}

/// Merge `patch` into `target`, recursing where both sides hold maps
pub(crate) fn deep_merge(target: &mut BTreeMap<String, Value>, patch: BTreeMap<String, Value>) {
    for (key, incoming) in patch {
        match incoming {
            Value::Map(incoming) => match target.get_mut(&key) {
                Some(Value::Map(existing)) => deep_merge(existing, incoming),
                _ => {
                    target.insert(key, Value::Map(incoming));
                }
            },
            other => {
                target.insert(key, other);
            }
        }
    }
}

/// Run each augmentation in order, merging as we go so later functions see
/// earlier output. Returns the messages of functions that panicked; their
/// output is skipped.
pub(crate) fn augment(observation: &mut Observation, fns: &[AugmentFn]) -> Vec<String> {
    let mut failures = Vec::new();
    for f in fns {
        match catch_unwind(AssertUnwindSafe(|| f(observation))) {
            Ok(patch) => deep_merge(observation, patch),
            Err(panic) => failures.push(panic_message(panic.as_ref())),
        }
    }
    failures
}

/// Copy values to their alias keys; source keys are kept
pub(crate) fn apply_aliases(observation: &mut Observation, aliases: &[AliasMap]) {
    for mapping in aliases {
        for (source, dest) in mapping {
            if let Some(value) = observation.get(source).cloned() {
                observation.insert(dest.clone(), value);
            }
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QueryValue;

    fn obs(pairs: &[(&str, Value)]) -> Observation {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_extract_uses_columns_as_allow_list() {
        let mut record = Record::new();
        record.insert("heapUsed".into(), QueryValue::Integer(512));
        record.insert("ignored".into(), QueryValue::Bool(true));

        let columns = vec![
            DisplayColumn::new("Heap", "heapUsed"),
            DisplayColumn::new("Missing", "gone"),
        ];
        let observation = extract(Some(&record), &columns);

        assert_eq!(observation.len(), 2);
        assert_eq!(observation["heapUsed"], Value::Number(512.0));
        assert_eq!(observation["gone"], Value::Null);
    }

    #[test]
    fn test_extract_without_record_yields_nulls() {
        let columns = vec![DisplayColumn::new("Heap", "heapUsed")];
        let observation = extract(None, &columns);
        assert_eq!(observation["heapUsed"], Value::Null);
    }

    #[test]
    fn test_deep_merge_recurses_into_maps() {
        let mut target = obs(&[(
            "mem",
            Value::Map(obs(&[("heap", 1.0.into()), ("pages", 2.0.into())])),
        )]);
        deep_merge(
            &mut target,
            obs(&[("mem", Value::Map(obs(&[("heap", 5.0.into())])))]),
        );

        let Value::Map(mem) = &target["mem"] else {
            panic!("expected map");
        };
        assert_eq!(mem["heap"], Value::Number(5.0));
        assert_eq!(mem["pages"], Value::Number(2.0));
    }

    #[test]
    fn test_augmentations_see_earlier_output() {
        let double: AugmentFn = Arc::new(|o: &Observation| {
            let v = o["value"].as_f64().unwrap_or_default();
            obs(&[("doubled", (v * 2.0).into())])
        });
        let plus_one: AugmentFn = Arc::new(|o: &Observation| {
            let v = o["doubled"].as_f64().unwrap_or_default();
            obs(&[("plusOne", (v + 1.0).into())])
        });

        let mut observation = obs(&[("value", 3.0.into())]);
        let failures = augment(&mut observation, &[double, plus_one]);

        assert!(failures.is_empty());
        assert_eq!(observation["doubled"], Value::Number(6.0));
        assert_eq!(observation["plusOne"], Value::Number(7.0));
    }

    #[test]
    fn test_panicking_augmentation_is_skipped() {
        let bad: AugmentFn =
            Arc::new(|_: &Observation| -> Observation { panic!("bad augmentation") });
        let good: AugmentFn = Arc::new(|_: &Observation| obs(&[("ok", true.into())]));

        let mut observation = obs(&[("value", 1.0.into())]);
        let failures = augment(&mut observation, &[bad, good]);

        assert_eq!(failures, vec!["bad augmentation".to_string()]);
        assert_eq!(observation["ok"], Value::Bool(true));
    }

    #[test]
    fn test_aliases_are_additive() {
        let mut observation = obs(&[("heapUsed", 10.0.into())]);
        let mut mapping = AliasMap::new();
        mapping.insert("heapUsed".into(), "heapUsed_core1".into());
        mapping.insert("absent".into(), "absent_core1".into());

        apply_aliases(&mut observation, &[mapping]);

        assert_eq!(observation["heapUsed"], Value::Number(10.0));
        assert_eq!(observation["heapUsed_core1"], Value::Number(10.0));
        assert!(!observation.contains_key("absent_core1"));
    }
}
