//! Property-based tests for identifier shortening, key consolidation,
//! metadata liveness and collector idempotence
//!
//! These tests use proptest to generate inputs and verify that:
//! 1. Shortened names are unique, short enough and never collide with kept names
//! 2. Renaming a whole program reaches every identifier the map covers
//! 3. Every table key reads the key record at its original type
//! 4. Pruning keeps exactly the metadata fields the program refers to
//! 5. Collectors give the same context when run twice

mod support;

use dpdkc::asm::{
    AluOp, AsmAction, AsmField, AsmProgram, AsmStmt, AsmStruct, AsmTable, CmpOp, Operand,
};
use dpdkc::context::ProgramStructure;
use dpdkc::ir::{
    Control, Declaration, Expr, ExprKind, Field, Key, Local, MatchKind, Program, Stmt, StructType,
    Table, Type,
};
use dpdkc::optimizer::liveness::used_metadata_fields;
use dpdkc::optimizer::rename::shorten_names;
use dpdkc::optimizer::{
    ApplyRenameMap, RemoveUnusedMetadataFields, ShortenTokenLength, MAX_IDENTIFIER_LEN,
};
use dpdkc::pass::{Analysis, Collector, Normalizer, PassContext, Rewrite};
use dpdkc::passes::{
    CollectLocalVariables, CollectMetadataHeaderInfo, CollectProgramStructure, CollectTableInfo,
    CopyMatchKeysToSingleStruct, ParseDpdkArchitecture,
};
use dpdkc::{ArchVariant, Artifacts, BackendOptions, Diagnostics};
use proptest::prelude::*;
use std::collections::BTreeSet;
use support::*;

// =============================================================================
// STRATEGY GENERATORS
// =============================================================================

/// Identifiers from 1 to 90 characters, some sharing long prefixes
fn identifier() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z_][a-z0-9_]{0,20}",
        "[a-z_][a-z0-9_]{55,89}",
        "[0-9]{1,4}".prop_map(|n| format!("{}_{}", "x".repeat(MAX_IDENTIFIER_LEN - 2), n)),
        "[0-9]{1,4}".prop_map(|n| format!("{}{}", "y".repeat(MAX_IDENTIFIER_LEN), n)),
    ]
}

/// A program whose header instance, field, table and action names are
/// generated; every name is used in several places
fn named_program() -> impl Strategy<Value = AsmProgram> {
    (identifier(), identifier(), identifier(), identifier()).prop_map(
        |(instance, field, table, action)| AsmProgram {
            header_types: vec![AsmStruct {
                name: "ipv4_t".into(),
                fields: vec![AsmField::new(field.clone(), 8)],
            }],
            structs: vec![AsmStruct {
                name: "metadata_t".into(),
                fields: vec![AsmField::new(field.clone(), 8)],
            }],
            headers: vec![(instance.clone(), "ipv4_t".into())],
            metadata: Some("metadata_t".into()),
            actions: vec![AsmAction {
                name: action.clone(),
                args: None,
                body: vec![AsmStmt::Return],
            }],
            tables: vec![AsmTable {
                name: table.clone(),
                keys: vec![(Operand::Meta(field.clone()), MatchKind::Exact)],
                actions: vec![(action.clone(), false)],
                default_action: action,
                default_args: Vec::new(),
                const_default: false,
                size: 1024,
                learner: false,
                entries: Vec::new(),
            }],
            apply: vec![
                AsmStmt::Extract(instance.clone()),
                AsmStmt::JmpInvalid {
                    target: "LABEL_SKIP".into(),
                    header: instance.clone(),
                },
                AsmStmt::Mov {
                    dst: Operand::Meta(field.clone()),
                    src: Operand::Header {
                        instance: instance.clone(),
                        field,
                    },
                },
                AsmStmt::Table(table),
                AsmStmt::Label("LABEL_SKIP".into()),
                AsmStmt::Emit(instance),
            ],
            ..AsmProgram::default()
        },
    )
}

/// Key expressions tables draw from, so keys repeat within and across tables
fn key_pool() -> Vec<Expr> {
    vec![
        ipv4("dst_addr", 32),
        ipv4("protocol", 8),
        ethernet("ether_type", 16),
        meta("hops", 32),
        Expr::is_valid(header("ipv4", "ipv4_t")),
    ]
}

/// Per table, the pool index and match kind of each key
fn key_layout() -> impl Strategy<Value = Vec<Vec<(usize, MatchKind)>>> {
    let kind = prop_oneof![
        Just(MatchKind::Exact),
        Just(MatchKind::Ternary),
        Just(MatchKind::Lpm),
    ];
    prop::collection::vec(prop::collection::vec((0..5usize, kind), 0..5), 1..5)
}

fn keyed_program(layout: &[Vec<(usize, MatchKind)>]) -> Program {
    let pool = key_pool();
    let mut locals = Vec::new();
    let mut body = Vec::new();
    for (n, keys) in layout.iter().enumerate() {
        let mut table = Table::new(format!("t{}", n));
        table.keys = keys
            .iter()
            .enumerate()
            .map(|(i, (k, kind))| Key {
                name: format!("k{}", i),
                expr: pool[*k].clone(),
                match_kind: *kind,
            })
            .collect();
        body.push(Stmt::Apply(table.name.clone()));
        locals.push(Local::Table(table));
    }
    Program {
        declarations: vec![
            Declaration::Struct(StructType {
                name: METADATA.into(),
                fields: vec![Field::new("hops", Type::bits(32))],
            }),
            Declaration::Control(Control {
                name: "ingress".into(),
                params: Vec::new(),
                locals,
                body,
            }),
        ],
        main: None,
    }
}

const FIELDS: usize = 8;

fn field_name(n: usize) -> String {
    format!("f{}", n)
}

fn operand() -> impl Strategy<Value = Operand> {
    prop_oneof![
        (0..FIELDS).prop_map(|n| Operand::Meta(field_name(n))),
        (0u64..16).prop_map(Operand::Imm),
        Just(Operand::Header {
            instance: "ipv4".into(),
            field: "ttl".into(),
        }),
    ]
}

fn instruction() -> impl Strategy<Value = AsmStmt> {
    let dst = (0..FIELDS).prop_map(|n| Operand::Meta(field_name(n)));
    prop_oneof![
        (dst.clone(), operand()).prop_map(|(dst, src)| AsmStmt::Mov { dst, src }),
        (dst, operand()).prop_map(|(dst, src)| AsmStmt::Alu {
            op: AluOp::Add,
            dst,
            src,
        }),
        (operand(), operand()).prop_map(|(left, right)| AsmStmt::JmpCmp {
            op: CmpOp::Eq,
            target: "L".into(),
            left,
            right,
        }),
        (0..FIELDS).prop_map(|n| AsmStmt::Tx(Operand::Meta(field_name(n)))),
        Just(AsmStmt::Label("L".into())),
        Just(AsmStmt::Drop),
    ]
}

fn asm_program() -> impl Strategy<Value = AsmProgram> {
    prop::collection::vec(instruction(), 0..40).prop_map(|apply| AsmProgram {
        structs: vec![AsmStruct {
            name: "metadata_t".into(),
            fields: (0..FIELDS).map(|n| AsmField::new(field_name(n), 32)).collect(),
        }],
        metadata: Some("metadata_t".into()),
        apply,
        ..AsmProgram::default()
    })
}

fn referenced_fields(program: &AsmProgram) -> BTreeSet<String> {
    let mut fields = BTreeSet::new();
    for body in program.bodies() {
        for stmt in body {
            let mut stmt = stmt.clone();
            for operand in stmt.operands_mut() {
                if let Some(field) = operand.meta_field() {
                    fields.insert(field.to_string());
                }
            }
        }
    }
    fields
}

/// Programs for both architectures with a varying number of locals and tables
fn fixture_program() -> impl Strategy<Value = (ArchVariant, Program)> {
    prop_oneof![
        (0usize..4, 0usize..3).prop_map(|(vars, tables)| {
            let tables = (0..tables)
                .map(|n| {
                    table(
                        &format!("t{}", n),
                        vec![key(
                            "hdr.ipv4.protocol",
                            ipv4("protocol", 8),
                            MatchKind::Exact,
                        )],
                        Vec::new(),
                    )
                })
                .collect();
            let mut control = pna_main_control(tables);
            for n in 0..vars {
                control.locals.push(Local::Var {
                    name: format!("v{}", n),
                    ty: Type::bits(16),
                });
            }
            (ArchVariant::Pna, pna_program_with(control))
        }),
        Just((ArchVariant::Psa, psa_program())),
    ]
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_rename_is_injective(names in prop::collection::vec(identifier(), 0..30)) {
        let map = shorten_names(names.iter().map(String::as_str));
        let kept: BTreeSet<&str> = names
            .iter()
            .map(String::as_str)
            .filter(|n| n.chars().count() <= MAX_IDENTIFIER_LEN)
            .collect();

        let mut targets = BTreeSet::new();
        for (from, to) in &map {
            prop_assert!(from.chars().count() > MAX_IDENTIFIER_LEN);
            prop_assert!(to.chars().count() <= MAX_IDENTIFIER_LEN);
            prop_assert!(!kept.contains(to.as_str()), "{} collides with a kept name", to);
            prop_assert!(targets.insert(to.clone()), "{} used twice", to);
        }
        for name in &names {
            if name.chars().count() > MAX_IDENTIFIER_LEN {
                prop_assert!(map.contains_key(name));
            }
        }
    }

    #[test]
    fn prop_rename_reaches_every_name(program in named_program()) {
        let mut before = Vec::new();
        program.for_each_name(&mut |n| before.push(n.to_string()));

        let options = BackendOptions::default();
        let mut structure = ProgramStructure::new(ArchVariant::Pna);
        let mut diagnostics = Diagnostics::new();
        let mut artifacts = Artifacts::default();
        let mut cx = PassContext {
            structure: &mut structure,
            diagnostics: &mut diagnostics,
            options: &options,
            artifacts: &mut artifacts,
        };
        let map = ShortenTokenLength.analyze(&program, &mut cx).unwrap();
        let renamed = ApplyRenameMap.rewrite(program, &map, &mut cx).unwrap();

        let mut after = Vec::new();
        renamed.for_each_name(&mut |n| after.push(n.to_string()));
        prop_assert_eq!(before.len(), after.len());
        for (old, new) in before.iter().zip(&after) {
            prop_assert!(new.chars().count() <= MAX_IDENTIFIER_LEN, "{} kept", new);
            prop_assert_eq!(new, map.get(old).unwrap_or(old));
        }

        // The published map agrees with the emitted text
        let text = renamed.to_string();
        for long in map.keys() {
            prop_assert!(!text.contains(long.as_str()), "{} still emitted", long);
        }
        prop_assert_eq!(&artifacts.rename_map, &map);
    }

    #[test]
    fn prop_every_key_reads_the_key_record(layout in key_layout()) {
        let options = BackendOptions::default();
        let mut structure = ProgramStructure::new(ArchVariant::Pna);
        structure.record_metadata_type(METADATA);
        let mut diagnostics = Diagnostics::new();
        let mut artifacts = Artifacts::default();
        let mut cx = PassContext {
            structure: &mut structure,
            diagnostics: &mut diagnostics,
            options: &options,
            artifacts: &mut artifacts,
        };
        let program = CopyMatchKeysToSingleStruct
            .normalize(keyed_program(&layout), &mut cx)
            .unwrap();

        let pool = key_pool();
        let key_struct = structure.key_struct();
        let control = program.control("ingress").unwrap();
        let mut references = 0;
        for (table, keys) in control.tables().zip(&layout) {
            prop_assert_eq!(table.keys.len(), keys.len());
            for (key, (k, _)) in table.keys.iter().zip(keys) {
                let original = &pool[*k];
                prop_assert_eq!(&key.expr.ty, &original.ty);
                let field = match &key.expr.kind {
                    ExprKind::Member { base, field }
                        if matches!(&base.kind, ExprKind::Path(p) if p == "m") => field,
                    _ => {
                        return Err(TestCaseError::fail(format!(
                            "key {} does not read the key record",
                            key.expr
                        )))
                    }
                };
                let recorded = key_struct.field(field).unwrap();
                prop_assert_eq!(&recorded.ty, &original.ty);
                prop_assert_eq!(&recorded.expr, original);
                references += 1;
            }
        }
        prop_assert_eq!(references, layout.iter().map(Vec::len).sum::<usize>());

        // One field per distinct key expression, all inside the metadata struct
        let distinct: BTreeSet<usize> = layout.iter().flatten().map(|(k, _)| *k).collect();
        prop_assert_eq!(key_struct.fields.len(), distinct.len());
        let metadata = program.struct_type(METADATA).unwrap();
        for field in &key_struct.fields {
            prop_assert!(metadata.field(&field.name).is_some(), "{} missing", field.name);
        }
    }

    #[test]
    fn prop_liveness_keeps_exactly_referenced_fields(program in asm_program()) {
        let used = used_metadata_fields(&program);
        let referenced = referenced_fields(&program);
        prop_assert_eq!(&used, &referenced);

        let options = BackendOptions::default();
        let mut structure = ProgramStructure::new(ArchVariant::Pna);
        let mut diagnostics = Diagnostics::new();
        let mut artifacts = Artifacts::default();
        let mut cx = PassContext {
            structure: &mut structure,
            diagnostics: &mut diagnostics,
            options: &options,
            artifacts: &mut artifacts,
        };
        let pruned = RemoveUnusedMetadataFields.rewrite(program, &used, &mut cx).unwrap();
        let kept: BTreeSet<String> = pruned
            .metadata_struct()
            .map(|s| s.fields.iter().map(|f| f.name.clone()).collect())
            .unwrap_or_default();

        // Nothing referenced was dropped, nothing unreferenced survived
        prop_assert_eq!(kept, referenced);
    }

    #[test]
    fn prop_collectors_are_idempotent((arch, program) in fixture_program()) {
        let mut structure = ProgramStructure::new(arch);
        ParseDpdkArchitecture.collect(&program, &mut structure).unwrap();

        let mut collectors: Vec<Box<dyn Collector<Program>>> = vec![
            Box::new(CollectTableInfo),
            Box::new(CollectProgramStructure),
            Box::new(CollectMetadataHeaderInfo),
            Box::new(CollectLocalVariables),
        ];
        for collector in collectors.iter_mut() {
            collector.collect(&program, &mut structure).unwrap();
            let once = structure.clone();
            collector.collect(&program, &mut structure).unwrap();
            prop_assert_eq!(&once, &structure, "{} changed the context", collector.name());
        }
    }
}
