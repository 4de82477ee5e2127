//! Collector passes: read the tree, record facts into the context

use crate::arch::{flattened_name, TABLE_ENTRY_INDEX_FIELD};
use crate::context::{ActionArgs, ExternInfo, LocalVar, ProgramStructure, TableInfo, TableKeyInfo};
use crate::error::{Error, Result};
use crate::ir::{Declaration, Direction, Field, Local, Param, Program, Type};
use crate::pass::Collector;

/// Binds the main package's arguments to architecture roles
pub struct ParseDpdkArchitecture;

impl Collector<Program> for ParseDpdkArchitecture {
    fn name(&self) -> &'static str {
        "ParseDpdkArchitecture"
    }

    fn collect(&mut self, program: &Program, structure: &mut ProgramStructure) -> Result<()> {
        let main = program.main.as_ref().ok_or(Error::MissingMain)?;
        let arch = structure.arch();
        if main.type_name != arch.package_type() {
            return Err(Error::UnknownPackage {
                name: main.type_name.clone(),
            });
        }
        for (index, role) in arch.roles().iter().enumerate() {
            let block = main
                .args
                .get(index)
                .filter(|name| program.control(name).is_some() || program.parser(name).is_some())
                .ok_or_else(|| Error::MissingBlock {
                    role: role.to_string(),
                })?;
            structure.record_block(*role, block.clone());
        }
        structure.record_package(main.clone());
        tracing::debug!(%arch, package = %main.type_name, "architecture parsed");
        Ok(())
    }
}

/// Records every table with its keys, actions and properties
pub struct CollectTableInfo;

impl Collector<Program> for CollectTableInfo {
    fn name(&self) -> &'static str {
        "CollectTableInfo"
    }

    fn collect(&mut self, program: &Program, structure: &mut ProgramStructure) -> Result<()> {
        for control in program.controls() {
            for table in control.tables() {
                structure.record_table(TableInfo {
                    control: control.name.clone(),
                    name: table.name.clone(),
                    keys: table
                        .keys
                        .iter()
                        .map(|k| TableKeyInfo {
                            name: k.name.clone(),
                            expr: k.expr.clone(),
                            ty: k.expr.ty.clone(),
                            match_kind: k.match_kind,
                            target: None,
                        })
                        .collect(),
                    actions: table.actions.clone(),
                    default_action: table.default_action.clone(),
                    const_default: table.const_default,
                    size: table.size,
                    entries: table.entries.clone(),
                    learner: table.add_on_miss,
                    direct_counter: table.direct_counter.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Marks learner tables and the default actions that may add entries
pub struct CollectAddOnMissTable;

impl Collector<Program> for CollectAddOnMissTable {
    fn name(&self) -> &'static str {
        "CollectAddOnMissTable"
    }

    fn collect(&mut self, program: &Program, structure: &mut ProgramStructure) -> Result<()> {
        for control in program.controls() {
            for table in control.tables().filter(|t| t.add_on_miss) {
                structure.record_learner_table(&table.name);
                if let Some(default) = &table.default_action {
                    structure.record_learner_action(default.name.clone());
                }
            }
        }
        Ok(())
    }
}

/// Header and struct types, header instances, the headers and metadata
/// struct types, and action data layouts
pub struct CollectProgramStructure;

impl Collector<Program> for CollectProgramStructure {
    fn name(&self) -> &'static str {
        "CollectProgramStructure"
    }

    fn collect(&mut self, program: &Program, structure: &mut ProgramStructure) -> Result<()> {
        for decl in &program.declarations {
            match decl {
                Declaration::Header(h) => structure.record_header_type(h.clone()),
                Declaration::Struct(s) => structure.record_struct_type(s.clone()),
                _ => {}
            }
        }

        if let Some((headers, metadata)) = user_struct_params(program, structure) {
            if let Some(st) = program.struct_type(&headers) {
                for field in &st.fields {
                    if let Type::Header(ty) = &field.ty {
                        structure.record_header_instance(field.name.clone(), ty.clone());
                    }
                }
            }
            structure.record_headers_type(headers);
            if let Some(metadata) = metadata {
                structure.record_metadata_type(metadata);
            }
        }

        let pipeline: Vec<_> = program
            .controls()
            .filter(|c| structure.is_pipeline_control(&c.name))
            .collect();
        for control in pipeline {
            for action in control.actions() {
                structure.record_action_args(ActionArgs {
                    action: action.name.clone(),
                    params: action
                        .data_params()
                        .map(|p| Field::new(p.name.clone(), p.ty.clone()))
                        .collect(),
                });
            }
        }
        for action in program.actions() {
            structure.record_action_args(ActionArgs {
                action: action.name.clone(),
                params: action
                    .data_params()
                    .map(|p| Field::new(p.name.clone(), p.ty.clone()))
                    .collect(),
            });
        }
        Ok(())
    }
}

/// Headers and user metadata struct types, read from the first parser's
/// parameters: the first struct-typed `out` is the headers, the next
/// struct-typed `inout` is the metadata
fn user_struct_params(
    program: &Program,
    structure: &ProgramStructure,
) -> Option<(String, Option<String>)> {
    let parser_role = structure.arch().roles().first().copied()?;
    let parser = program.parser(structure.block(parser_role)?)?;
    let arch = structure.arch();
    let mut headers = None;
    let mut metadata = None;
    for param in &parser.params {
        let Type::Struct(name) = &param.ty else {
            continue;
        };
        if arch.standard_struct(name).is_some() {
            continue;
        }
        match param.direction {
            Direction::Out if headers.is_none() => headers = Some(name.clone()),
            Direction::InOut if headers.is_some() && metadata.is_none() => {
                metadata = Some(name.clone())
            }
            _ => {}
        }
    }
    headers.map(|h| (h, metadata))
}

/// Flattened fields of the built-in metadata parameters of every bound block
pub struct CollectMetadataHeaderInfo;

impl Collector<Program> for CollectMetadataHeaderInfo {
    fn name(&self) -> &'static str {
        "CollectMetadataHeaderInfo"
    }

    fn collect(&mut self, program: &Program, structure: &mut ProgramStructure) -> Result<()> {
        let arch = structure.arch();
        let mut fields = Vec::new();
        for (_, block) in structure.blocks() {
            for param in block_params(program, block) {
                let Type::Struct(type_name) = &param.ty else {
                    continue;
                };
                if let Some(std_fields) = arch.standard_struct(type_name) {
                    for f in std_fields {
                        fields.push(Field::new(flattened_name(type_name, &f.name), f.ty));
                    }
                }
            }
        }
        for field in fields {
            structure.record_compiler_added_field(field);
        }
        Ok(())
    }
}

pub(crate) fn block_params<'p>(program: &'p Program, block: &str) -> &'p [Param] {
    if let Some(c) = program.control(block) {
        &c.params
    } else if let Some(p) = program.parser(block) {
        &p.params
    } else {
        &[]
    }
}

/// Block-local variables, each flattened to a metadata field `<block>_<name>`
pub struct CollectLocalVariables;

impl Collector<Program> for CollectLocalVariables {
    fn name(&self) -> &'static str {
        "CollectLocalVariables"
    }

    fn collect(&mut self, program: &Program, structure: &mut ProgramStructure) -> Result<()> {
        let mut vars = Vec::new();
        for (_, block) in structure.blocks() {
            let locals: &[Local] = if let Some(c) = program.control(block) {
                &c.locals
            } else if let Some(p) = program.parser(block) {
                &p.locals
            } else {
                &[]
            };
            for local in locals {
                if let Local::Var { name, ty } = local {
                    vars.push(LocalVar {
                        block: block.to_string(),
                        name: name.clone(),
                        mangled: format!("{}_{}", block, name),
                        ty: ty.clone(),
                    });
                }
            }
        }
        for var in vars {
            structure.record_local_var(var);
        }
        Ok(())
    }
}

/// Error names in declaration order; the position is the error code
pub struct CollectErrors;

impl Collector<Program> for CollectErrors {
    fn name(&self) -> &'static str {
        "CollectErrors"
    }

    fn collect(&mut self, program: &Program, structure: &mut ProgramStructure) -> Result<()> {
        for name in program.error_names() {
            structure.record_error(name);
        }
        Ok(())
    }
}

/// Extern instances declared in bound blocks
pub struct CollectExternDeclaration;

impl Collector<Program> for CollectExternDeclaration {
    fn name(&self) -> &'static str {
        "CollectExternDeclaration"
    }

    fn collect(&mut self, program: &Program, structure: &mut ProgramStructure) -> Result<()> {
        let mut found = Vec::new();
        for control in program.controls() {
            for instance in control.externs() {
                found.push(ExternInfo {
                    block: control.name.clone(),
                    instance: instance.clone(),
                });
            }
        }
        for info in found {
            structure.record_extern(info);
        }
        Ok(())
    }
}

/// Direct counters and the tables they are attached to
pub struct CollectDirectCounterMeter;

impl Collector<Program> for CollectDirectCounterMeter {
    fn name(&self) -> &'static str {
        "CollectDirectCounterMeter"
    }

    fn collect(&mut self, program: &Program, structure: &mut ProgramStructure) -> Result<()> {
        for control in program.controls() {
            for table in control.tables() {
                if let Some(counter) = &table.direct_counter {
                    structure.record_direct_resource(counter, &table.name);
                }
            }
        }
        if structure.has_direct_resources() {
            structure.record_compiler_added_field(Field::new(TABLE_ENTRY_INDEX_FIELD, Type::bits(32)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::{ArchVariant, BlockRole};
    use crate::ir::{Action, Control, PackageInstance, Parser, ParserState, Transition};

    fn control(name: &str) -> Declaration {
        Declaration::Control(Control {
            name: name.into(),
            params: Vec::new(),
            locals: vec![Local::Var {
                name: "flag".into(),
                ty: Type::Bool,
            }],
            body: Vec::new(),
        })
    }

    fn program() -> Program {
        Program {
            declarations: vec![
                Declaration::Parser(Parser {
                    name: "MainParserImpl".into(),
                    params: Vec::new(),
                    locals: Vec::new(),
                    states: vec![ParserState {
                        name: "start".into(),
                        body: Vec::new(),
                        transition: Transition::Accept,
                    }],
                }),
                control("PreControlImpl"),
                control("MainControlImpl"),
                control("MainDeparserImpl"),
            ],
            main: Some(PackageInstance {
                type_name: "PNA_NIC".into(),
                args: vec![
                    "MainParserImpl".into(),
                    "PreControlImpl".into(),
                    "MainControlImpl".into(),
                    "MainDeparserImpl".into(),
                ],
            }),
        }
    }

    #[test]
    fn test_parse_architecture_binds_roles() {
        let mut ps = ProgramStructure::new(ArchVariant::Pna);
        let result = ParseDpdkArchitecture.collect(&program(), &mut ps);
        assert_eq!(result, Ok(()));
        assert_eq!(ps.block(BlockRole::MainControl), Some("MainControlImpl"));
        assert!(ps.is_pipeline_control("PreControlImpl"));
        assert!(!ps.is_pipeline_control("MainDeparserImpl"));
    }

    #[test]
    fn test_missing_main_is_contract_violation() {
        let mut p = program();
        p.main = None;
        let mut ps = ProgramStructure::new(ArchVariant::Pna);
        assert_eq!(
            ParseDpdkArchitecture.collect(&p, &mut ps),
            Err(Error::MissingMain)
        );
    }

    #[test]
    fn test_missing_block_is_contract_violation() {
        let mut p = program();
        if let Some(main) = p.main.as_mut() {
            main.args.truncate(2);
        }
        let mut ps = ProgramStructure::new(ArchVariant::Pna);
        assert_eq!(
            ParseDpdkArchitecture.collect(&p, &mut ps),
            Err(Error::MissingBlock {
                role: "main_control".into()
            })
        );
    }

    #[test]
    fn test_action_data_of_pipeline_controls() {
        let mut p = program();
        let forward = Action {
            name: "forward".into(),
            params: vec![Param::new("port", Type::bits(32), Direction::None)],
            body: Vec::new(),
        };
        for decl in &mut p.declarations {
            if let Declaration::Control(c) = decl {
                if c.name == "MainControlImpl" {
                    c.locals.push(Local::Action(forward.clone()));
                }
            }
        }
        let mut ps = ProgramStructure::new(ArchVariant::Pna);
        let _ = ParseDpdkArchitecture.collect(&p, &mut ps);
        assert_eq!(CollectProgramStructure.collect(&p, &mut ps), Ok(()));

        let args = ps.action_args("forward").map(|a| a.params.clone());
        assert_eq!(args, Some(vec![Field::new("port", Type::bits(32))]));
        assert_eq!(
            ps.action_args("forward").map(|a| a.struct_name()),
            Some("forward_arg_t".to_string())
        );
    }

    #[test]
    fn test_local_variables_are_mangled() {
        let p = program();
        let mut ps = ProgramStructure::new(ArchVariant::Pna);
        let _ = ParseDpdkArchitecture.collect(&p, &mut ps);
        let _ = CollectLocalVariables.collect(&p, &mut ps);
        assert_eq!(
            ps.local_var("MainControlImpl", "flag").map(|v| v.mangled.as_str()),
            Some("MainControlImpl_flag")
        );
    }
}
