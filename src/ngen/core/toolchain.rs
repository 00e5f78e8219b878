use indexmap::IndexMap;

use crate::core::label::Label;
use crate::core::label_ptr::LabelTargetPair;
use crate::core::source_file::FileType;
use crate::core::substitution::SubstitutionBits;
use crate::core::target::Target;
use crate::core::tool::{self, Tool};
use crate::frontend::value::ValueMap;
use crate::util::errors::{ErrorKind, GenError, Location, NgenResult};

/// A named collection of tools plus build-arg overrides. Each toolchain
/// produces an independent instantiation of the target graph and its own
/// subdirectory of outputs.
///
/// The label never changes and can be read from any thread; the tools are
/// only valid once the toolchain item has resolved.
#[derive(Debug)]
pub struct Toolchain {
    label: Label,
    defined_from: Option<Location>,
    tools: IndexMap<&'static str, Tool>,
    setup_complete: bool,
    substitution_bits: SubstitutionBits,
    /// Targets that must be resolved before building anything in this
    /// toolchain.
    pub deps: Vec<LabelTargetPair>,
    /// Build argument overrides applied to the base scope of files loaded in
    /// this toolchain, as if passed on the command line.
    pub args: ValueMap,
    /// Whether public_configs and all_dependent_configs on targets in this
    /// toolchain propagate to targets in other toolchains.
    pub propagates_configs: bool,
}

impl Toolchain {
    pub fn new(label: Label, defined_from: Option<Location>) -> Toolchain {
        let mut tools = IndexMap::new();
        // The "phony" tool is part of all toolchains by default.
        let mut phony = Tool::new_builtin_phony();
        phony
            .set_complete()
            .expect("builtin phony tool always validates");
        tools.insert(phony.name(), phony);

        Toolchain {
            label,
            defined_from,
            tools,
            setup_complete: false,
            substitution_bits: SubstitutionBits::default(),
            deps: Vec::new(),
            args: ValueMap::new(),
            propagates_configs: false,
        }
    }

    pub fn label(&self) -> &Label {
        &self.label
    }

    pub fn defined_from(&self) -> Option<&Location> {
        self.defined_from.as_ref()
    }

    pub fn get_tool(&self, name: &str) -> Option<&Tool> {
        debug_assert!(name != tool::TOOL_NONE);
        self.tools.get(name)
    }

    /// Inserts a tool, completing it first. Redeclaration (including of the
    /// builtin `phony`) is an error.
    pub fn set_tool(&mut self, mut t: Tool) -> NgenResult<()> {
        debug_assert!(!self.setup_complete);
        if self.tools.contains_key(t.name()) {
            return Err(GenError::new(
                ErrorKind::DuplicateItem,
                format!(
                    "tool \"{}\" is declared twice in toolchain {}",
                    t.name(),
                    self.label.get_user_visible_name(false)
                ),
            )
            .at(t.defined_from().cloned())
            .into());
        }
        if !t.is_complete() {
            t.set_complete()?;
        }
        self.tools.insert(t.name(), t);
        Ok(())
    }

    /// Does final setup once all tools are known: merges the substitution
    /// bits from every tool.
    pub fn toolchain_setup_complete(&mut self) {
        for t in self.tools.values() {
            self.substitution_bits.merge_from(t.substitution_bits());
        }
        self.setup_complete = true;
    }

    pub fn substitution_bits(&self) -> &SubstitutionBits {
        debug_assert!(self.setup_complete);
        &self.substitution_bits
    }

    pub fn tools(&self) -> impl Iterator<Item = &Tool> {
        self.tools.values()
    }

    /// Mutable tool access for the Builder, which fills in pool pointers
    /// once the referenced pools resolve. Pool pointers are the one field
    /// set after tool completion.
    pub(crate) fn tools_mut(&mut self) -> impl Iterator<Item = &mut Tool> {
        self.tools.values_mut()
    }

    /// The tool compiling the given source file type, if this toolchain
    /// defines one.
    pub fn get_tool_for_source_type(&self, file_type: FileType) -> Option<&Tool> {
        match Tool::tool_for_source_type(file_type) {
            tool::TOOL_NONE => None,
            name => self.get_tool(name),
        }
    }

    /// The tool producing the given target's canonical output. This is not
    /// always the tool you would expect: copy targets, groups, and the other
    /// non-linked types map to `stamp` so there is one file to depend on.
    pub fn get_tool_for_target_final_output(&self, target: &Target) -> Option<&Tool> {
        match target.tool_name_for_final_output() {
            tool::TOOL_NONE => None,
            name => self.get_tool(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::source_dir::SourceDir;
    use crate::core::substitution::{SubstitutionList, SubstitutionPattern, SubstitutionType};

    fn toolchain() -> Toolchain {
        Toolchain::new(
            Label::new_with_no_toolchain(SourceDir::new("//tc/"), "default"),
            None,
        )
    }

    fn stamp_tool() -> Tool {
        let mut t = Tool::create("stamp", None).unwrap();
        t.command = SubstitutionPattern::parse("touch {{output}}", None).unwrap();
        t
    }

    #[test]
    fn phony_preconstructed() {
        let tc = toolchain();
        assert!(tc.get_tool("phony").is_some());
        assert!(tc.get_tool("phony").unwrap().is_builtin());
    }

    #[test]
    fn duplicate_tool_rejected() {
        let mut tc = toolchain();
        tc.set_tool(stamp_tool()).unwrap();
        let err = tc.set_tool(stamp_tool()).unwrap_err();
        let gen = err.downcast_ref::<GenError>().unwrap();
        assert_eq!(gen.kind, ErrorKind::DuplicateItem);
    }

    #[test]
    fn setup_complete_merges_bits() {
        let mut tc = toolchain();
        let mut cc = Tool::create("cc", None).unwrap();
        cc.command = SubstitutionPattern::parse("gcc {{cflags}} -c {{source}}", None).unwrap();
        cc.outputs = SubstitutionList::parse(
            &["{{source_out_dir}}/{{source_name_part}}.o".to_string()],
            None,
        )
        .unwrap();
        tc.set_tool(cc).unwrap();
        tc.set_tool(stamp_tool()).unwrap();
        tc.toolchain_setup_complete();
        assert!(tc.substitution_bits().has(SubstitutionType::CFlags));
        assert!(tc.substitution_bits().has(SubstitutionType::Output));
    }
}
