//! Lowers parsed declarations into typed `Item`s: the boundary where the
//! declarative source becomes the build graph's data model.

use crate::core::config::{Config, ConfigValues};
use crate::core::item::Item;
use crate::core::label::Label;
use crate::core::label_pattern::LabelPattern;
use crate::core::label_ptr::{LabelPoolPair, LabelPtrPair, LabelTargetPair};
use crate::core::pool::Pool;
use crate::core::settings::Settings;
use crate::core::source_dir::SourceDir;
use crate::core::source_file::SourceFile;
use crate::core::substitution::{SubstitutionList, SubstitutionPattern};
use crate::core::target::{CrateType, OutputType, Target};
use crate::core::tool::{DepsFormat, PrecompiledHeaderType, Tool};
use crate::core::toolchain::Toolchain;
use crate::frontend::parser::{AssignOp, Expr, Statement};
use crate::frontend::value::{Scope, Value, ValueKind, ValueMap};
use crate::util::errors::{ErrorKind, GenError, Location, NgenResult};

fn exec_error(message: String, location: Location) -> anyhow::Error {
    GenError::new(ErrorKind::Parse, message)
        .at(Some(location))
        .into()
}

fn eval_expr(expr: &Expr, scope: &Scope<'_>, location: &Location) -> NgenResult<Value> {
    let kind = match expr {
        Expr::BoolLiteral(b) => ValueKind::Bool(*b),
        Expr::IntLiteral(i) => ValueKind::Int(*i),
        Expr::StringLiteral(s) => ValueKind::String(s.clone()),
        Expr::Ident(name) => {
            let value = scope.get(name).ok_or_else(|| {
                exec_error(format!("undefined identifier \"{}\"", name), location.clone())
            })?;
            return Ok(value.clone());
        }
        Expr::List(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(eval_expr(item, scope, location)?);
            }
            ValueKind::List(values)
        }
        Expr::ScopeBlock(statements) => {
            let mut child = Scope::with_parent(scope);
            exec_assignments_only(statements, &mut child)?;
            ValueKind::Scope(child.into_values())
        }
    };
    Ok(Value::new(kind, Some(location.clone())))
}

fn exec_assignment(
    name: &str,
    op: AssignOp,
    value: Value,
    scope: &mut Scope<'_>,
    location: &Location,
) -> NgenResult<()> {
    match op {
        AssignOp::Assign => scope.set(name.to_string(), value),
        AssignOp::Append => {
            let existing = scope.get(name).cloned().ok_or_else(|| {
                exec_error(
                    format!("\"{}\" must be defined before using +=", name),
                    location.clone(),
                )
            })?;
            let combined = match (existing.kind, value.kind) {
                (ValueKind::List(mut a), ValueKind::List(b)) => {
                    a.extend(b);
                    ValueKind::List(a)
                }
                (ValueKind::String(mut a), ValueKind::String(b)) => {
                    a.push_str(&b);
                    ValueKind::String(a)
                }
                _ => {
                    return Err(exec_error(
                        format!("\"{}\": += requires two lists or two strings", name),
                        location.clone(),
                    ))
                }
            };
            scope.set(name.to_string(), Value::new(combined, Some(location.clone())));
        }
    }
    Ok(())
}

/// Executes statements that may only be assignments: the dotfile, args.gn,
/// and `--args` text all use this restricted form.
pub fn exec_standalone_assignments(
    statements: &[Statement],
    scope: &mut Scope<'_>,
) -> NgenResult<()> {
    exec_assignments_only(statements, scope)
}

/// Executes a block that may only contain assignments (target bodies, scope
/// literals).
fn exec_assignments_only(statements: &[Statement], scope: &mut Scope<'_>) -> NgenResult<()> {
    for statement in statements {
        match statement {
            Statement::Assign {
                name,
                op,
                value,
                location,
            } => {
                let value = eval_expr(value, scope, location)?;
                exec_assignment(name, *op, value, scope, location)?;
            }
            Statement::Call { function, location, .. } => {
                return Err(exec_error(
                    format!("\"{}\" may not be called here", function),
                    location.clone(),
                ));
            }
        }
    }
    Ok(())
}

// =============================================================================
// Scope readers

/// Reads declaration variables out of an executed block, tracking which were
/// consumed so leftovers can be reported (an assignment nothing reads is
/// almost always a typo).
struct BlockReader<'a> {
    map: &'a ValueMap,
    used: Vec<&'a str>,
    dir: SourceDir,
    current_toolchain: Label,
    location: Location,
}

impl<'a> BlockReader<'a> {
    fn new(
        map: &'a ValueMap,
        dir: SourceDir,
        current_toolchain: Label,
        location: Location,
    ) -> BlockReader<'a> {
        BlockReader {
            map,
            used: Vec::new(),
            dir,
            current_toolchain,
            location,
        }
    }

    fn take(&mut self, name: &'static str) -> Option<&'a Value> {
        let value = self.map.get(name);
        if value.is_some() {
            self.used.push(name);
        }
        value
    }

    fn string(&mut self, name: &'static str) -> NgenResult<Option<String>> {
        match self.take(name) {
            Some(v) => Ok(Some(v.as_string()?.to_string())),
            None => Ok(None),
        }
    }

    fn boolean(&mut self, name: &'static str) -> NgenResult<Option<bool>> {
        match self.take(name) {
            Some(v) => Ok(Some(v.as_bool()?)),
            None => Ok(None),
        }
    }

    fn integer(&mut self, name: &'static str) -> NgenResult<Option<i64>> {
        match self.take(name) {
            Some(v) => Ok(Some(v.as_int()?)),
            None => Ok(None),
        }
    }

    fn string_list(&mut self, name: &'static str) -> NgenResult<Vec<String>> {
        match self.take(name) {
            Some(v) => v.as_string_list(),
            None => Ok(Vec::new()),
        }
    }

    fn source_files(&mut self, name: &'static str) -> NgenResult<Vec<SourceFile>> {
        let dir = self.dir;
        match self.take(name) {
            Some(v) => v
                .as_list()?
                .iter()
                .map(|item| dir.resolve_relative_file(item.as_string()?, item.origin.clone()))
                .collect(),
            None => Ok(Vec::new()),
        }
    }

    fn source_file(&mut self, name: &'static str) -> NgenResult<Option<SourceFile>> {
        let dir = self.dir;
        match self.take(name) {
            Some(v) => Ok(Some(
                dir.resolve_relative_file(v.as_string()?, v.origin.clone())?,
            )),
            None => Ok(None),
        }
    }

    fn source_dirs(&mut self, name: &'static str) -> NgenResult<Vec<SourceDir>> {
        let dir = self.dir;
        match self.take(name) {
            Some(v) => v
                .as_list()?
                .iter()
                .map(|item| dir.resolve_relative_dir(item.as_string()?, item.origin.clone()))
                .collect(),
            None => Ok(Vec::new()),
        }
    }

    fn label(&mut self, name: &'static str) -> NgenResult<Option<Label>> {
        let dir = self.dir;
        let tc = self.current_toolchain;
        match self.take(name) {
            Some(v) => Ok(Some(Label::resolve(
                &dir,
                &tc,
                v.as_string()?,
                v.origin.clone(),
            )?)),
            None => Ok(None),
        }
    }

    fn label_pairs<T>(&mut self, name: &'static str) -> NgenResult<Vec<LabelPtrPair<T>>> {
        let dir = self.dir;
        let tc = self.current_toolchain;
        match self.take(name) {
            Some(v) => v
                .as_list()?
                .iter()
                .map(|item| {
                    let label = Label::resolve(&dir, &tc, item.as_string()?, item.origin.clone())?;
                    Ok(LabelPtrPair::new(label, item.origin.clone()))
                })
                .collect(),
            None => Ok(Vec::new()),
        }
    }

    fn patterns(&mut self, name: &'static str) -> NgenResult<Vec<LabelPattern>> {
        let dir = self.dir;
        match self.take(name) {
            Some(v) => v
                .as_list()?
                .iter()
                .map(|item| LabelPattern::resolve(&dir, item.as_string()?, item.origin.clone()))
                .collect(),
            None => Ok(Vec::new()),
        }
    }

    fn subst_pattern(&mut self, name: &'static str) -> NgenResult<Option<SubstitutionPattern>> {
        match self.take(name) {
            Some(v) => Ok(Some(SubstitutionPattern::parse(
                v.as_string()?,
                v.origin.clone(),
            )?)),
            None => Ok(None),
        }
    }

    fn subst_list(&mut self, name: &'static str) -> NgenResult<Option<SubstitutionList>> {
        match self.take(name) {
            Some(v) => {
                let strings = v.as_string_list()?;
                Ok(Some(SubstitutionList::parse(&strings, v.origin.clone())?))
            }
            None => Ok(None),
        }
    }

    /// Errors on any variable the declaration never consumed.
    fn finish(self) -> NgenResult<()> {
        for key in self.map.keys() {
            if !self.used.iter().any(|u| u == key) {
                return Err(exec_error(
                    format!("assignment of \"{}\" was never used", key),
                    self.map
                        .get(key)
                        .and_then(|v| v.origin.clone())
                        .unwrap_or(self.location),
                ));
            }
        }
        Ok(())
    }
}

fn extract_config_values(reader: &mut BlockReader<'_>) -> NgenResult<ConfigValues> {
    let mut values = ConfigValues::default();
    values.arflags = reader.string_list("arflags")?;
    values.asmflags = reader.string_list("asmflags")?;
    values.cflags = reader.string_list("cflags")?;
    values.cflags_c = reader.string_list("cflags_c")?;
    values.cflags_cc = reader.string_list("cflags_cc")?;
    values.cflags_objc = reader.string_list("cflags_objc")?;
    values.cflags_objcc = reader.string_list("cflags_objcc")?;
    values.defines = reader.string_list("defines")?;
    values.frameworks = reader.string_list("frameworks")?;
    values.weak_frameworks = reader.string_list("weak_frameworks")?;
    values.framework_dirs = reader.source_dirs("framework_dirs")?;
    values.include_dirs = reader.source_dirs("include_dirs")?;
    values.ldflags = reader.string_list("ldflags")?;
    values.lib_dirs = reader.source_dirs("lib_dirs")?;
    values.libs = reader.string_list("libs")?;
    values.precompiled_header = reader.string("precompiled_header")?.unwrap_or_default();
    values.precompiled_source = reader.source_file("precompiled_source")?;
    values.rustflags = reader.string_list("rustflags")?;
    values.rustenv = reader.string_list("rustenv")?;
    values.swiftflags = reader.string_list("swiftflags")?;
    Ok(values)
}

// =============================================================================
// FileExecutor

/// Executes the statements of one build file in one toolchain context,
/// producing typed items. This is the callback surface the core exposes to
/// the frontend.
pub struct FileExecutor<'a> {
    settings: &'a Settings,
    dir: SourceDir,
    pub items: Vec<Item>,
    /// Filled when the file calls `set_default_toolchain()` (meaningful only
    /// for the build config file).
    pub default_toolchain: Option<Label>,
}

impl<'a> FileExecutor<'a> {
    pub fn new(settings: &'a Settings, file: SourceFile) -> FileExecutor<'a> {
        FileExecutor {
            settings,
            dir: file.get_dir(),
            items: Vec::new(),
            default_toolchain: None,
        }
    }

    fn current_toolchain(&self) -> Label {
        *self.settings.toolchain_label()
    }

    pub fn run(&mut self, statements: &[Statement], scope: &mut Scope<'_>) -> NgenResult<()> {
        for statement in statements {
            match statement {
                Statement::Assign {
                    name,
                    op,
                    value,
                    location,
                } => {
                    let value = eval_expr(value, scope, location)?;
                    exec_assignment(name, *op, value, scope, location)?;
                }
                Statement::Call {
                    function,
                    args,
                    block,
                    location,
                } => self.exec_call(function, args, block.as_deref(), location, scope)?,
            }
        }
        Ok(())
    }

    fn single_string_arg(
        &self,
        function: &str,
        args: &[Expr],
        location: &Location,
        scope: &Scope<'_>,
    ) -> NgenResult<String> {
        if args.len() != 1 {
            return Err(exec_error(
                format!("{}() takes exactly one argument", function),
                location.clone(),
            ));
        }
        let value = eval_expr(&args[0], scope, location)?;
        Ok(value.as_string()?.to_string())
    }

    fn exec_call(
        &mut self,
        function: &str,
        args: &[Expr],
        block: Option<&[Statement]>,
        location: &Location,
        scope: &mut Scope<'_>,
    ) -> NgenResult<()> {
        if let Some(output_type) = OutputType::from_str(function) {
            let name = self.single_string_arg(function, args, location, scope)?;
            let block = block.ok_or_else(|| {
                exec_error(format!("{}() requires a block", function), location.clone())
            })?;
            let item = self.make_target(output_type, &name, block, location, scope)?;
            self.items.push(item);
            return Ok(());
        }

        match function {
            "config" => {
                let name = self.single_string_arg(function, args, location, scope)?;
                let block = block.ok_or_else(|| {
                    exec_error("config() requires a block".to_string(), location.clone())
                })?;
                let item = self.make_config(&name, block, location, scope)?;
                self.items.push(item);
                Ok(())
            }
            "pool" => {
                let name = self.single_string_arg(function, args, location, scope)?;
                let block = block.ok_or_else(|| {
                    exec_error("pool() requires a block".to_string(), location.clone())
                })?;
                let item = self.make_pool(&name, block, location, scope)?;
                self.items.push(item);
                Ok(())
            }
            "toolchain" => {
                let name = self.single_string_arg(function, args, location, scope)?;
                let block = block.ok_or_else(|| {
                    exec_error("toolchain() requires a block".to_string(), location.clone())
                })?;
                let item = self.make_toolchain(&name, block, location, scope)?;
                self.items.push(item);
                Ok(())
            }
            "set_default_toolchain" => {
                let label_str = self.single_string_arg(function, args, location, scope)?;
                let label = Label::resolve(
                    &self.dir,
                    &Label::default(),
                    &label_str,
                    Some(location.clone()),
                )?;
                self.default_toolchain = Some(label);
                Ok(())
            }
            "declare_args" => {
                let block = block.ok_or_else(|| {
                    exec_error(
                        "declare_args() requires a block".to_string(),
                        location.clone(),
                    )
                })?;
                self.exec_declare_args(block, scope)
            }
            "assert" => {
                if args.is_empty() {
                    return Err(exec_error(
                        "assert() requires a condition".to_string(),
                        location.clone(),
                    ));
                }
                let cond = eval_expr(&args[0], scope, location)?.as_bool()?;
                if !cond {
                    let message = match args.get(1) {
                        Some(expr) => eval_expr(expr, scope, location)?
                            .as_string()?
                            .to_string(),
                        None => "assertion failed".to_string(),
                    };
                    return Err(exec_error(message, location.clone()));
                }
                Ok(())
            }
            "print" => {
                let mut parts = Vec::new();
                for arg in args {
                    let value = eval_expr(arg, scope, location)?;
                    match value.kind {
                        ValueKind::String(s) => parts.push(s),
                        other => parts.push(Value::new(other, None).to_string()),
                    }
                }
                println!("{}", parts.join(" "));
                Ok(())
            }
            other => Err(exec_error(
                format!("unsupported function \"{}\"", other),
                location.clone(),
            )),
        }
    }

    fn exec_declare_args(
        &mut self,
        block: &[Statement],
        scope: &mut Scope<'_>,
    ) -> NgenResult<()> {
        let mut defaults = Scope::with_parent(scope);
        exec_assignments_only(block, &mut defaults)?;
        let declared = defaults.into_values();

        let args = self.settings.build_settings().build_args();
        for (name, default_value) in declared {
            let value = args.lookup(&name).unwrap_or(default_value);
            scope.set(name, value);
        }
        Ok(())
    }

    fn exec_block_scope(
        &self,
        block: &[Statement],
        scope: &Scope<'_>,
    ) -> NgenResult<ValueMap> {
        let mut child = Scope::with_parent(scope);
        exec_assignments_only(block, &mut child)?;
        Ok(child.into_values())
    }

    fn make_label(&self, name: &str) -> Label {
        Label::new(
            self.dir,
            name,
            *self.current_toolchain().dir(),
            self.current_toolchain().name(),
        )
    }

    fn make_target(
        &mut self,
        output_type: OutputType,
        name: &str,
        block: &[Statement],
        location: &Location,
        scope: &Scope<'_>,
    ) -> NgenResult<Item> {
        let values = self.exec_block_scope(block, scope)?;
        let mut reader = BlockReader::new(
            &values,
            self.dir,
            self.current_toolchain(),
            location.clone(),
        );

        let mut target = Target::new(self.make_label(name), Some(location.clone()));
        target.output_type = output_type;

        target.sources = reader.source_files("sources")?;
        if let Some(public) = reader.take("public") {
            target.all_headers_public = false;
            target.public_headers = public
                .as_list()?
                .iter()
                .map(|item| {
                    self.dir
                        .resolve_relative_file(item.as_string()?, item.origin.clone())
                })
                .collect::<NgenResult<_>>()?;
        }
        target.inputs = reader.source_files("inputs")?;
        target.data = reader.string_list("data")?;
        target.testonly = reader.boolean("testonly")?.unwrap_or(false);
        target.visibility = reader.patterns("visibility")?;
        target.assert_no_deps = reader.patterns("assert_no_deps")?;

        target.private_deps = reader.label_pairs("deps")?;
        target.public_deps = reader.label_pairs("public_deps")?;
        target.data_deps = reader.label_pairs("data_deps")?;
        target.gen_deps = reader.label_pairs("gen_deps")?;

        target.configs = reader.label_pairs("configs")?;
        target.public_configs = reader.label_pairs("public_configs")?;
        target.all_dependent_configs = reader.label_pairs("all_dependent_configs")?;

        if let Some(name) = reader.string("output_name")? {
            target.output_name = name;
        }
        target.output_prefix_override =
            reader.boolean("output_prefix_override")?.unwrap_or(false);
        if let Some(ext) = reader.string("output_extension")? {
            target.output_extension = Some(ext);
        }
        if let Some(dir) = reader.string("output_dir")? {
            target.output_dir = Some(self.dir.resolve_relative_dir(&dir, Some(location.clone()))?);
        }
        target.complete_static_lib = reader.boolean("complete_static_lib")?.unwrap_or(false);
        target.write_runtime_deps = reader.source_file("write_runtime_deps")?;

        if let Some(pool) = reader.label("pool")? {
            target.pool = Some(LabelPoolPair::new(pool, Some(location.clone())));
        }

        // Compile/link values declared directly on the target.
        let own_values = extract_config_values(&mut reader)?;
        if has_any_config_values(&own_values) {
            *target.config_values_mut() = own_values;
        }

        match output_type {
            OutputType::Action | OutputType::ActionForeach => {
                let action = target.action_values_mut();
                action.script = reader
                    .source_file("script")?
                    .ok_or_else(|| {
                        exec_error("action requires a script".to_string(), location.clone())
                    })?;
                if let Some(args) = reader.subst_list("args")? {
                    action.args = args;
                }
                action.outputs = reader.subst_list("outputs")?.ok_or_else(|| {
                    exec_error("action requires outputs".to_string(), location.clone())
                })?;
                if let Some(depfile) = reader.subst_pattern("depfile")? {
                    action.depfile = depfile;
                }
                if let Some(rsp) = reader.subst_list("response_file_contents")? {
                    action.response_file_contents = rsp;
                }
            }
            OutputType::CopyFiles => {
                let action = target.action_values_mut();
                action.outputs = reader.subst_list("outputs")?.ok_or_else(|| {
                    exec_error("copy requires outputs".to_string(), location.clone())
                })?;
            }
            OutputType::GeneratedFile => {
                let action = target.action_values_mut();
                action.outputs = reader.subst_list("outputs")?.ok_or_else(|| {
                    exec_error(
                        "generated_file requires outputs".to_string(),
                        location.clone(),
                    )
                })?;
                if action.outputs.list().len() != 1 {
                    return Err(exec_error(
                        "generated_file requires exactly one output".to_string(),
                        location.clone(),
                    ));
                }
                let generated = target.generated_file_mut();
                generated.contents = reader.take("contents").cloned();
                generated.output_conversion =
                    reader.string("output_conversion")?.unwrap_or_default();
            }
            OutputType::CreateBundle => {
                let bundle = target.bundle_data_mut();
                bundle.product_type = reader.string("product_type")?.unwrap_or_default();
                bundle.transparent = reader.boolean("transparent")?.unwrap_or(false);
            }
            _ => {}
        }

        if matches!(
            output_type,
            OutputType::RustLibrary | OutputType::RustProcMacro
        ) || target
            .sources
            .iter()
            .any(|s| s.get_type() == crate::core::source_file::FileType::Rs)
        {
            let crate_name = reader.string("crate_name")?;
            let crate_root = reader.source_file("crate_root")?;
            let crate_type = reader.string("crate_type")?;
            let aliased = reader.take("aliased_deps").cloned();

            let label_name = target.label().name().to_string();
            let sources = target.sources.clone();
            let rust = target.rust_values_mut();
            rust.crate_name = crate::core::interning::Atom::new(
                crate_name.as_deref().unwrap_or(&label_name),
            );
            rust.crate_root = match crate_root {
                Some(root) => root,
                None => infer_crate_root(&sources, output_type).ok_or_else(|| {
                    exec_error(
                        "can't deduce crate_root; set it explicitly".to_string(),
                        location.clone(),
                    )
                })?,
            };
            if let Some(ct) = crate_type {
                rust.crate_type = CrateType::from_str(&ct).ok_or_else(|| {
                    exec_error(format!("unknown crate_type \"{}\"", ct), location.clone())
                })?;
            }
            if let Some(aliased) = aliased {
                let map = aliased.as_scope()?;
                for (alias, dep) in map {
                    let dep_label = Label::resolve(
                        &self.dir,
                        &self.current_toolchain(),
                        dep.as_string()?,
                        dep.origin.clone(),
                    )?;
                    rust.aliased_deps.insert(dep_label, alias.clone());
                }
            }
        }

        if let Some(metadata) = reader.take("metadata") {
            let map = metadata.as_scope()?;
            let md = target.metadata_mut();
            for (key, value) in map {
                md.contents
                    .insert(key.clone(), value.as_list()?.to_vec());
            }
        }

        if let Some(module_name) = reader.string("module_name")? {
            target.swift_values_mut().module_name = module_name;
        }

        reader.finish()?;
        Ok(Item::Target(target))
    }

    fn make_config(
        &mut self,
        name: &str,
        block: &[Statement],
        location: &Location,
        scope: &Scope<'_>,
    ) -> NgenResult<Item> {
        let values = self.exec_block_scope(block, scope)?;
        let mut reader = BlockReader::new(
            &values,
            self.dir,
            self.current_toolchain(),
            location.clone(),
        );

        let mut config = Config::new(self.make_label(name), Some(location.clone()));
        config.visibility = reader.patterns("visibility")?;
        config.testonly = reader.boolean("testonly")?.unwrap_or(false);
        config.configs = reader.label_pairs("configs")?;
        config.own_values = extract_config_values(&mut reader)?;
        config.own_values.inputs = reader.source_files("inputs")?;

        reader.finish()?;
        Ok(Item::Config(config))
    }

    fn make_pool(
        &mut self,
        name: &str,
        block: &[Statement],
        location: &Location,
        scope: &Scope<'_>,
    ) -> NgenResult<Item> {
        let values = self.exec_block_scope(block, scope)?;
        let mut reader = BlockReader::new(
            &values,
            self.dir,
            self.current_toolchain(),
            location.clone(),
        );
        let depth = reader.integer("depth")?.ok_or_else(|| {
            exec_error("pool requires a depth".to_string(), location.clone())
        })?;
        if depth < 1 {
            return Err(exec_error(
                "pool depth must be positive".to_string(),
                location.clone(),
            ));
        }
        reader.finish()?;
        Ok(Item::Pool(Pool::new(
            self.make_label(name),
            Some(location.clone()),
            depth,
        )))
    }

    fn make_toolchain(
        &mut self,
        name: &str,
        block: &[Statement],
        location: &Location,
        scope: &Scope<'_>,
    ) -> NgenResult<Item> {
        let label = Label::new_with_no_toolchain(self.dir, name);
        let mut toolchain = Toolchain::new(label, Some(location.clone()));

        for statement in block {
            match statement {
                Statement::Assign {
                    name,
                    op: AssignOp::Assign,
                    value,
                    location,
                } => {
                    let value = eval_expr(value, scope, location)?;
                    match name.as_str() {
                        "toolchain_args" => {
                            toolchain.args = value.as_scope()?.clone();
                        }
                        "propagates_configs" => {
                            toolchain.propagates_configs = value.as_bool()?;
                        }
                        "deps" => {
                            // Toolchain deps are instantiated in the
                            // toolchain being defined.
                            let tc_label = *toolchain.label();
                            let deps = value
                                .as_list()?
                                .iter()
                                .map(|item| {
                                    let dep = Label::resolve(
                                        &self.dir,
                                        &tc_label,
                                        item.as_string()?,
                                        item.origin.clone(),
                                    )?;
                                    Ok(LabelTargetPair::new(dep, item.origin.clone()))
                                })
                                .collect::<NgenResult<_>>()?;
                            toolchain.deps = deps;
                        }
                        other => {
                            return Err(exec_error(
                                format!("unsupported toolchain variable \"{}\"", other),
                                location.clone(),
                            ))
                        }
                    }
                }
                Statement::Call {
                    function,
                    args,
                    block: tool_block,
                    location,
                } if function == "tool" => {
                    let tool_name = self.single_string_arg(function, args, location, scope)?;
                    let tool_block = tool_block.as_deref().ok_or_else(|| {
                        exec_error("tool() requires a block".to_string(), location.clone())
                    })?;
                    let tool = self.make_tool(&tool_name, tool_block, location, scope)?;
                    toolchain.set_tool(tool)?;
                }
                Statement::Call { function, location, .. } => {
                    return Err(exec_error(
                        format!("\"{}\" may not be called inside a toolchain", function),
                        location.clone(),
                    ));
                }
                Statement::Assign { name, location, .. } => {
                    return Err(exec_error(
                        format!("\"{}\": += is not valid inside a toolchain", name),
                        location.clone(),
                    ));
                }
            }
        }

        toolchain.toolchain_setup_complete();
        Ok(Item::Toolchain(toolchain))
    }

    fn make_tool(
        &mut self,
        tool_name: &str,
        block: &[Statement],
        location: &Location,
        scope: &Scope<'_>,
    ) -> NgenResult<Tool> {
        let mut tool = Tool::create(tool_name, Some(location.clone())).ok_or_else(|| {
            exec_error(format!("unknown tool type \"{}\"", tool_name), location.clone())
        })?;

        let values = self.exec_block_scope(block, scope)?;
        let mut reader = BlockReader::new(
            &values,
            self.dir,
            self.current_toolchain(),
            location.clone(),
        );

        if let Some(p) = reader.subst_pattern("command")? {
            tool.command = p;
        }
        if let Some(s) = reader.string("command_launcher")? {
            tool.command_launcher = s;
        }
        if let Some(p) = reader.subst_pattern("description")? {
            tool.description = p;
        }
        if let Some(p) = reader.subst_pattern("depfile")? {
            tool.depfile = p;
        }
        if let Some(list) = reader.subst_list("outputs")? {
            tool.outputs = list;
        }
        if let Some(list) = reader.subst_list("partial_outputs")? {
            tool.partial_outputs = list;
        }
        if let Some(list) = reader.subst_list("runtime_outputs")? {
            tool.runtime_outputs = list;
        }
        if let Some(p) = reader.subst_pattern("default_output_dir")? {
            tool.default_output_dir = p;
        }
        if let Some(ext) = reader.string("default_output_extension")? {
            if !ext.is_empty() && !ext.starts_with('.') {
                return Err(exec_error(
                    "default_output_extension must begin with a '.'".to_string(),
                    location.clone(),
                ));
            }
            tool.default_output_extension = ext;
        }
        if let Some(s) = reader.string("output_prefix")? {
            tool.output_prefix = s;
        }
        if let Some(b) = reader.boolean("restat")? {
            tool.restat = b;
        }
        if let Some(p) = reader.subst_pattern("rspfile")? {
            tool.rspfile = p;
        }
        if let Some(p) = reader.subst_pattern("rspfile_content")? {
            tool.rspfile_content = p;
        }
        if let Some(label) = reader.label("pool")? {
            tool.pool = Some(LabelPoolPair::new(label, Some(location.clone())));
        }
        if let Some(s) = reader.string("lib_switch")? {
            tool.lib_switch = s;
        }
        if let Some(s) = reader.string("lib_dir_switch")? {
            tool.lib_dir_switch = s;
        }
        if let Some(s) = reader.string("framework_switch")? {
            tool.framework_switch = s;
        }
        if let Some(s) = reader.string("weak_framework_switch")? {
            tool.weak_framework_switch = s;
        }
        if let Some(s) = reader.string("framework_dir_switch")? {
            tool.framework_dir_switch = s;
        }
        if let Some(s) = reader.string("swiftmodule_switch")? {
            tool.swiftmodule_switch = s;
        }

        if let Some(format) = reader.string("depsformat")? {
            let data = tool.as_c_mut().ok_or_else(|| {
                exec_error(
                    "depsformat is only valid on C tools".to_string(),
                    location.clone(),
                )
            })?;
            data.depsformat = match format.as_str() {
                "gcc" => DepsFormat::Gcc,
                "msvc" => DepsFormat::Msvc,
                other => {
                    return Err(exec_error(
                        format!("unknown depsformat \"{}\"", other),
                        location.clone(),
                    ))
                }
            };
        }
        if let Some(pch) = reader.string("precompiled_header_type")? {
            let data = tool.as_c_mut().ok_or_else(|| {
                exec_error(
                    "precompiled_header_type is only valid on C tools".to_string(),
                    location.clone(),
                )
            })?;
            data.precompiled_header_type = match pch.as_str() {
                "" => PrecompiledHeaderType::None,
                "gcc" => PrecompiledHeaderType::Gcc,
                "msvc" => PrecompiledHeaderType::Msvc,
                other => {
                    return Err(exec_error(
                        format!("unknown precompiled_header_type \"{}\"", other),
                        location.clone(),
                    ))
                }
            };
        }
        if let Some(p) = reader.subst_pattern("link_output")? {
            tool.as_c_mut()
                .ok_or_else(|| {
                    exec_error(
                        "link_output is only valid on C tools".to_string(),
                        location.clone(),
                    )
                })?
                .link_output = p;
        }
        if let Some(p) = reader.subst_pattern("depend_output")? {
            tool.as_c_mut()
                .ok_or_else(|| {
                    exec_error(
                        "depend_output is only valid on C tools".to_string(),
                        location.clone(),
                    )
                })?
                .depend_output = p;
        }
        if let Some(s) = reader.string("rust_sysroot")? {
            tool.as_rust_mut()
                .ok_or_else(|| {
                    exec_error(
                        "rust_sysroot is only valid on Rust tools".to_string(),
                        location.clone(),
                    )
                })?
                .rust_sysroot = s;
        }
        if let Some(s) = reader.string("dynamic_link_switch")? {
            tool.as_rust_mut()
                .ok_or_else(|| {
                    exec_error(
                        "dynamic_link_switch is only valid on Rust tools".to_string(),
                        location.clone(),
                    )
                })?
                .dynamic_link_switch = s;
        }

        reader.finish()?;
        Ok(tool)
    }
}

fn has_any_config_values(values: &ConfigValues) -> bool {
    !(values.arflags.is_empty()
        && values.asmflags.is_empty()
        && values.cflags.is_empty()
        && values.cflags_c.is_empty()
        && values.cflags_cc.is_empty()
        && values.cflags_objc.is_empty()
        && values.cflags_objcc.is_empty()
        && values.defines.is_empty()
        && values.frameworks.is_empty()
        && values.weak_frameworks.is_empty()
        && values.framework_dirs.is_empty()
        && values.include_dirs.is_empty()
        && values.ldflags.is_empty()
        && values.lib_dirs.is_empty()
        && values.libs.is_empty()
        && values.precompiled_header.is_empty()
        && values.precompiled_source.is_none()
        && values.rustflags.is_empty()
        && values.rustenv.is_empty()
        && values.swiftflags.is_empty())
}

/// Picks the conventional crate root from the source list when the target
/// doesn't name one.
fn infer_crate_root(sources: &[SourceFile], output_type: OutputType) -> Option<SourceFile> {
    let conventional = if output_type == OutputType::Executable {
        "main.rs"
    } else {
        "lib.rs"
    };
    if let Some(found) = sources.iter().find(|s| s.get_name() == conventional) {
        return Some(*found);
    }
    let rust_sources: Vec<&SourceFile> = sources
        .iter()
        .filter(|s| s.get_type() == crate::core::source_file::FileType::Rs)
        .collect();
    match rust_sources.as_slice() {
        [only] => Some(**only),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::build_settings::BuildSettings;
    use crate::frontend::parser::parse_file;
    use std::sync::Arc;

    fn settings() -> Settings {
        let tc = Label::new_with_no_toolchain(SourceDir::new("//tc/"), "default");
        Settings::new(Arc::new(BuildSettings::default()), tc, tc)
    }

    fn run(input: &str) -> Vec<Item> {
        let settings = settings();
        let file = SourceFile::new("//foo/BUILD.gn");
        let statements = parse_file(input, &file).unwrap();
        let mut executor = FileExecutor::new(&settings, file);
        let mut scope = Scope::new(ValueMap::new());
        executor.run(&statements, &mut scope).unwrap();
        executor.items
    }

    #[test]
    fn lowers_an_executable() {
        let items = run(
            r#"
            executable("bin") {
              sources = [ "main.cc", "util.cc" ]
              deps = [ ":helper" ]
              defines = [ "FOO=1" ]
              testonly = true
            }
            "#,
        );
        assert_eq!(items.len(), 1);
        let target = items[0].as_target().unwrap();
        assert_eq!(target.output_type, OutputType::Executable);
        assert_eq!(target.label().get_user_visible_name(false), "//foo:bin");
        assert_eq!(target.sources.len(), 2);
        assert_eq!(target.sources[0].value(), "//foo/main.cc");
        assert_eq!(target.private_deps.len(), 1);
        assert_eq!(
            target.private_deps[0].label.get_user_visible_name(false),
            "//foo:helper"
        );
        assert!(target.testonly);
        assert_eq!(target.config_values().defines, vec!["FOO=1"]);
    }

    #[test]
    fn unused_variable_is_an_error() {
        let settings = settings();
        let file = SourceFile::new("//foo/BUILD.gn");
        let statements =
            parse_file("group(\"g\") { bogus_var = 1 }", &file).unwrap();
        let mut executor = FileExecutor::new(&settings, file);
        let mut scope = Scope::new(ValueMap::new());
        assert!(executor.run(&statements, &mut scope).is_err());
    }

    #[test]
    fn lowers_a_toolchain() {
        let items = run(
            r#"
            toolchain("gcc") {
              tool("cc") {
                command = "gcc {{defines}} {{cflags}} -c {{source}} -o {{output}}"
                outputs = [ "{{source_out_dir}}/{{source_name_part}}.o" ]
              }
              tool("stamp") {
                command = "touch {{output}}"
              }
              toolchain_args = {
                cpu = "x64"
              }
              propagates_configs = true
            }
            "#,
        );
        let toolchain = items[0].as_toolchain().unwrap();
        assert!(toolchain.get_tool("cc").is_some());
        assert!(toolchain.get_tool("stamp").is_some());
        assert!(toolchain.propagates_configs);
        assert_eq!(toolchain.args.len(), 1);
    }

    #[test]
    fn lowers_rust_library() {
        let items = run(
            r#"
            rust_library("mylib") {
              sources = [ "lib.rs", "util.rs" ]
              crate_name = "my_lib"
            }
            "#,
        );
        let target = items[0].as_target().unwrap();
        let rust = target.rust_values();
        assert_eq!(rust.crate_name.as_str(), "my_lib");
        assert_eq!(rust.crate_root.value(), "//foo/lib.rs");
        assert_eq!(rust.crate_type, CrateType::Auto);
    }
}
