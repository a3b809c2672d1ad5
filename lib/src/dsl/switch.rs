use super::{Error, InsnBuilder};
use crate::jvm::code::{Insn, Label};
use std::collections::{BTreeMap, HashSet};

/// Most entries a dense jump table may have
///
/// Each entry takes four bytes, so a larger table could never fit in a method's code.
pub const MAX_TABLE_SWITCH_ENTRIES: i64 = 16_384;

type Body<'a, 'r> = Box<dyn FnOnce(&mut InsnBuilder<'r>) -> Result<(), Error> + 'a>;

struct Case<'a, 'r> {
    key: i32,
    body: Body<'a, 'r>,

    /// Whether control continues into the next case rather than past the switch
    fallthrough: bool,
}

/// Cases of a switch, to be emitted with [`InsnBuilder::table_switch`] or
/// [`InsnBuilder::lookup_switch`]
///
/// Case bodies are emitted in the order they are added, each followed by a jump past the end of
/// the switch (unless added with [`SwitchBuilder::case_fallthrough`]). The default body comes
/// last.
pub struct SwitchBuilder<'a, 'r> {
    cases: Vec<Case<'a, 'r>>,
    default: Option<Body<'a, 'r>>,
}

#[allow(clippy::new_without_default)]
impl<'a, 'r> SwitchBuilder<'a, 'r> {
    pub fn new() -> SwitchBuilder<'a, 'r> {
        SwitchBuilder {
            cases: vec![],
            default: None,
        }
    }

    pub fn case(
        mut self,
        key: i32,
        body: impl FnOnce(&mut InsnBuilder<'r>) -> Result<(), Error> + 'a,
    ) -> Self {
        self.cases.push(Case {
            key,
            body: Box::new(body),
            fallthrough: false,
        });
        self
    }

    /// Case which runs on into the body of the case added after it
    pub fn case_fallthrough(
        mut self,
        key: i32,
        body: impl FnOnce(&mut InsnBuilder<'r>) -> Result<(), Error> + 'a,
    ) -> Self {
        self.cases.push(Case {
            key,
            body: Box::new(body),
            fallthrough: true,
        });
        self
    }

    /// Body for keys matching no case (by default, nothing happens)
    pub fn default(
        mut self,
        body: impl FnOnce(&mut InsnBuilder<'r>) -> Result<(), Error> + 'a,
    ) -> Self {
        self.default = Some(Box::new(body));
        self
    }

    fn check_keys(&self) -> Result<(), Error> {
        if self.cases.is_empty() {
            return Err(Error::EmptySwitch);
        }
        let mut seen = HashSet::new();
        for case in &self.cases {
            if !seen.insert(case.key) {
                return Err(Error::DuplicateSwitchKey(case.key));
            }
        }
        Ok(())
    }
}

impl<'r> InsnBuilder<'r> {
    /// Switch on the `int` on top of the stack, with a dense jump table from the lowest to the
    /// highest key
    ///
    /// Keys in that range without a case go to the default. Ranges wider than
    /// [`MAX_TABLE_SWITCH_ENTRIES`] are rejected; use [`InsnBuilder::lookup_switch`] for sparse
    /// keys.
    pub fn table_switch(&mut self, switch: SwitchBuilder<'_, 'r>) -> Result<&mut Self, Error> {
        switch.check_keys()?;
        let low = switch.cases.iter().map(|case| case.key).min().unwrap_or(0);
        let high = switch.cases.iter().map(|case| case.key).max().unwrap_or(0);
        if high as i64 - low as i64 + 1 > MAX_TABLE_SWITCH_ENTRIES {
            return Err(Error::SwitchTooWide { low, high });
        }

        let labels = self.case_labels(&switch);
        let default = self.make_label();
        let targets = (low as i64..=high as i64)
            .map(|key| labels.get(&(key as i32)).copied().unwrap_or(default))
            .collect();

        self.push(Insn::TableSwitch {
            low,
            high,
            default,
            targets,
        });
        self.emit_cases(switch, &labels, default)
    }

    /// Switch on the `int` on top of the stack, with a sorted key to target table
    pub fn lookup_switch(&mut self, switch: SwitchBuilder<'_, 'r>) -> Result<&mut Self, Error> {
        switch.check_keys()?;
        let labels = self.case_labels(&switch);
        let default = self.make_label();

        let pairs = labels.iter().map(|(key, label)| (*key, *label)).collect();
        self.push(Insn::LookupSwitch { default, pairs });
        self.emit_cases(switch, &labels, default)
    }

    fn case_labels(&mut self, switch: &SwitchBuilder<'_, 'r>) -> BTreeMap<i32, Label> {
        switch
            .cases
            .iter()
            .map(|case| (case.key, self.make_label()))
            .collect()
    }

    fn emit_cases(
        &mut self,
        switch: SwitchBuilder<'_, 'r>,
        labels: &BTreeMap<i32, Label>,
        default: Label,
    ) -> Result<&mut Self, Error> {
        let end = self.make_label();
        for case in switch.cases {
            if let Some(label) = labels.get(&case.key) {
                self.place_label(*label)?;
            }
            (case.body)(self)?;
            if !case.fallthrough {
                self.goto(end);
            }
        }

        self.place_label(default)?;
        if let Some(body) = switch.default {
            body(self)?;
        }
        self.place_label(end)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::opcodes::*;

    fn case_body(value: i32) -> impl FnOnce(&mut InsnBuilder) -> Result<(), Error> {
        move |b| {
            b.int(value).pop();
            Ok(())
        }
    }

    #[test]
    fn empty_and_duplicate_cases_are_rejected() {
        let mut builder = InsnBuilder::new(0);
        assert!(matches!(
            builder.table_switch(SwitchBuilder::new()),
            Err(Error::EmptySwitch)
        ));
        let switch = SwitchBuilder::new()
            .case(1, case_body(1))
            .case(1, case_body(2));
        assert!(matches!(
            builder.lookup_switch(switch),
            Err(Error::DuplicateSwitchKey(1))
        ));
    }

    #[test]
    fn wide_tables_are_rejected() {
        let mut builder = InsnBuilder::new(0);
        builder.int(0);
        let switch = SwitchBuilder::new()
            .case(i32::MIN, case_body(1))
            .case(i32::MAX, case_body(2));
        assert!(matches!(
            builder.table_switch(switch),
            Err(Error::SwitchTooWide {
                low: i32::MIN,
                high: i32::MAX
            })
        ));

        // Exactly at the limit is still fine
        let high = MAX_TABLE_SWITCH_ENTRIES as i32 - 1;
        let switch = SwitchBuilder::new()
            .case(0, case_body(1))
            .case(high, case_body(2));
        builder.table_switch(switch).unwrap();

        // The same keys are fine as a lookup
        let mut builder = InsnBuilder::new(0);
        builder.int(0);
        let switch = SwitchBuilder::new()
            .case(i32::MIN, case_body(1))
            .case(i32::MAX, case_body(2));
        builder.lookup_switch(switch).unwrap();
        builder.build().unwrap();
    }

    #[test]
    fn table_holes_go_to_default() {
        let mut builder = InsnBuilder::new(0);
        builder.int(0);
        let switch = SwitchBuilder::new()
            .case(4, case_body(40))
            .case(1, case_body(10))
            .default(case_body(0));
        builder.table_switch(switch).unwrap();
        let insns = builder.build().unwrap();

        match &insns[1] {
            Insn::TableSwitch {
                low,
                high,
                default,
                targets,
            } => {
                assert_eq!((*low, *high), (1, 4));
                assert_eq!(targets.len(), 4);
                assert_eq!(targets[1], *default);
                assert_eq!(targets[2], *default);
                assert_ne!(targets[0], *default);
                assert_ne!(targets[3], *default);

                // Case bodies in the order they were added
                let key_4 = insns.iter().position(|i| *i == Insn::Label(targets[3]));
                let key_1 = insns.iter().position(|i| *i == Insn::Label(targets[0]));
                assert!(key_4 < key_1);
            }
            other => panic!("unexpected {}", other),
        }
    }

    #[test]
    fn lookup_keys_are_sorted() {
        let mut builder = InsnBuilder::new(0);
        builder.int(0);
        let switch = SwitchBuilder::new()
            .case(1000, case_body(1))
            .case(-5, case_body(2))
            .case(7, case_body(3));
        builder.lookup_switch(switch).unwrap();
        let insns = builder.build().unwrap();

        match &insns[1] {
            Insn::LookupSwitch { pairs, .. } => {
                let keys: Vec<i32> = pairs.iter().map(|(key, _)| *key).collect();
                assert_eq!(keys, vec![-5, 7, 1000]);
            }
            other => panic!("unexpected {}", other),
        }
    }

    #[test]
    fn fallthrough_cases_skip_the_goto() {
        let mut builder = InsnBuilder::new(0);
        builder.int(0);
        let switch = SwitchBuilder::new()
            .case_fallthrough(0, case_body(1))
            .case(1, case_body(2));
        builder.table_switch(switch).unwrap();
        let insns = builder.build().unwrap();

        let gotos = insns
            .iter()
            .filter(|insn| matches!(insn, Insn::Jump(GOTO, _)))
            .count();
        assert_eq!(gotos, 1);
    }
}
