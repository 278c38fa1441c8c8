//! Product identifiers and the mission-override strategy table.
//!
//! Some products need corrections that cannot be derived from their labels
//! (wrong start bytes, misdeclared sample types, blocks that need patching).
//! Rather than scattering special cases through the decoders, overrides live
//! in one ordered table of `(step, predicate, action)` rules. Each resolution
//! step consults the table once; the first matching rule wins. The crate
//! ships the mechanism only; mission catalogs are built by callers.

use crate::dtypes::ElementType;
use crate::label::{LabelBlock, LabelPatch};

/// Label parameters conventionally used to recognize products for special
/// handling, pulled from the top level of the label. Any may be absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Identifiers {
    pub data_set_id: Option<String>,
    pub data_set_name: Option<String>,
    pub file_name: Option<String>,
    pub file_records: Option<i64>,
    pub instrument_id: Option<String>,
    pub instrument_host_name: Option<String>,
    pub instrument_name: Option<String>,
    pub label_records: Option<i64>,
    pub note: Option<String>,
    pub product_id: Option<String>,
    pub product_type: Option<String>,
    pub record_bytes: Option<i64>,
    pub record_type: Option<String>,
    pub row_bytes: Option<i64>,
    pub rows: Option<i64>,
    pub spacecraft_name: Option<String>,
    pub standard_data_product_id: Option<String>,
}

impl Identifiers {
    pub fn from_label(label: &LabelBlock) -> Identifiers {
        let text = |key: &str| label.find_str(key).map(str::to_string);
        let int = |key: &str| label.find_int(key);
        Identifiers {
            data_set_id: text("DATA_SET_ID"),
            data_set_name: text("DATA_SET_NAME"),
            file_name: text("FILE_NAME"),
            file_records: int("FILE_RECORDS"),
            instrument_id: text("INSTRUMENT_ID"),
            instrument_host_name: text("INSTRUMENT_HOST_NAME"),
            instrument_name: text("INSTRUMENT_NAME"),
            label_records: int("LABEL_RECORDS"),
            note: text("NOTE"),
            product_id: text("PRODUCT_ID"),
            product_type: text("PRODUCT_TYPE"),
            record_bytes: int("RECORD_BYTES"),
            record_type: text("RECORD_TYPE"),
            row_bytes: int("ROW_BYTES"),
            rows: int("ROWS"),
            spacecraft_name: text("SPACECRAFT_NAME"),
            standard_data_product_id: text("STANDARD_DATA_PRODUCT_ID"),
        }
    }
}

/// Resolution steps at which an override rule may intervene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Metadata block selection for an object.
    Block,
    /// Start-byte resolution for an object's data.
    StartByte,
    /// Sample/element type resolution.
    SampleType,
    /// Table/array structure resolution.
    Structure,
}

/// What a matching rule does at its step.
#[derive(Debug, Clone)]
pub enum Action {
    /// Apply label patches to the object's metadata block.
    PatchBlock(Vec<LabelPatch>),
    /// Use this start byte instead of the resolved one.
    SetStartByte(u64),
    /// Use this element type instead of the resolved one.
    SetElementType(ElementType),
    /// Refuse to decode the object, with a reason.
    Unsupported(String),
}

type Predicate = Box<dyn Fn(&Identifiers, &str) -> bool + Send + Sync>;

pub struct OverrideRule {
    pub step: Step,
    predicate: Predicate,
    pub action: Action,
}

/// Ordered override rules; first match at a step wins.
#[derive(Default)]
pub struct OverrideTable {
    rules: Vec<OverrideRule>,
}

impl OverrideTable {
    pub fn new() -> OverrideTable {
        OverrideTable::default()
    }

    pub fn push<P>(&mut self, step: Step, predicate: P, action: Action)
    where
        P: Fn(&Identifiers, &str) -> bool + Send + Sync + 'static,
    {
        self.rules.push(OverrideRule {
            step,
            predicate: Box::new(predicate),
            action,
        });
    }

    /// The first rule matching this step, product, and object name.
    pub fn first_match(
        &self,
        step: Step,
        identifiers: &Identifiers,
        object_name: &str,
    ) -> Option<&Action> {
        self.rules
            .iter()
            .find(|r| r.step == step && (r.predicate)(identifiers, object_name))
            .map(|r| &r.action)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_matching_rule_wins() {
        let mut table = OverrideTable::new();
        table.push(
            Step::StartByte,
            |ids: &Identifiers, name: &str| {
                ids.instrument_id.as_deref() == Some("CRISM") && name == "IMAGE"
            },
            Action::SetStartByte(512),
        );
        table.push(
            Step::StartByte,
            |_: &Identifiers, _: &str| true,
            Action::SetStartByte(0),
        );
        let ids = Identifiers {
            instrument_id: Some("CRISM".to_string()),
            ..Identifiers::default()
        };
        match table.first_match(Step::StartByte, &ids, "IMAGE") {
            Some(Action::SetStartByte(n)) => assert_eq!(*n, 512),
            other => panic!("unexpected action: {other:?}"),
        }
        assert!(table
            .first_match(Step::Block, &ids, "IMAGE")
            .is_none());
    }
}
