//! Program fixtures shared by the integration tests
//!
//! Builds small typed programs for both architectures: an Ethernet/IPv4
//! parser, one forwarding table in the main control and a deparser that
//! emits both headers.

#![allow(dead_code)]

use dpdkc::ir::{
    Action, ActionRef, ActionScope, Control, Declaration, Direction, Expr, Field, HeaderType,
    Key, KeySetValue, Local, MatchKind, MethodCall, PackageInstance, Param, Parser, ParserState,
    Program, SelectCase, Stmt, StructType, Table, TableAction, TableEntry, Transition, Type,
};

pub const HEADERS: &str = "headers_t";
pub const METADATA: &str = "metadata_t";
pub const FORWARD_TABLE: &str = "ipv4_host";

pub fn headers_ty() -> Type {
    Type::Struct(HEADERS.into())
}

pub fn metadata_ty() -> Type {
    Type::Struct(METADATA.into())
}

/// `hdr.<header>`
pub fn header(name: &str, ty: &str) -> Expr {
    Expr::member(Expr::path("hdr", headers_ty()), name, Type::Header(ty.into()))
}

/// `hdr.ipv4.<field>`
pub fn ipv4(field: &str, width: u32) -> Expr {
    Expr::member(header("ipv4", "ipv4_t"), field, Type::bits(width))
}

/// `hdr.ethernet.<field>`
pub fn ethernet(field: &str, width: u32) -> Expr {
    Expr::member(header("ethernet", "ethernet_t"), field, Type::bits(width))
}

/// `meta.<field>`
pub fn meta(field: &str, width: u32) -> Expr {
    Expr::member(Expr::path("meta", metadata_ty()), field, Type::bits(width))
}

fn types() -> Vec<Declaration> {
    let bits = |name: &str, width: u32| Field::new(name, Type::bits(width));
    vec![
        Declaration::Header(HeaderType {
            name: "ethernet_t".into(),
            fields: vec![bits("dst_addr", 48), bits("src_addr", 48), bits("ether_type", 16)],
        }),
        Declaration::Header(HeaderType {
            name: "ipv4_t".into(),
            fields: vec![
                bits("version_ihl", 8),
                bits("diffserv", 8),
                bits("total_len", 16),
                bits("identification", 16),
                bits("flags_frag_offset", 16),
                bits("ttl", 8),
                bits("protocol", 8),
                bits("hdr_checksum", 16),
                bits("src_addr", 32),
                bits("dst_addr", 32),
            ],
        }),
        Declaration::Struct(StructType {
            name: HEADERS.into(),
            fields: vec![
                Field::new("ethernet", Type::Header("ethernet_t".into())),
                Field::new("ipv4", Type::Header("ipv4_t".into())),
            ],
        }),
        Declaration::Struct(StructType {
            name: METADATA.into(),
            fields: vec![bits("hops", 32), bits("limit", 32)],
        }),
    ]
}

/// Parser extracting Ethernet, then IPv4 when the EtherType says so
pub fn parser(name: &str, istd: &str) -> Parser {
    let pkt = Expr::path("pkt", Type::Packet);
    let extract = |h: Expr| Stmt::Call(MethodCall::new(pkt.clone(), "extract", vec![h]));
    Parser {
        name: name.into(),
        params: vec![
            Param::new("pkt", Type::Packet, Direction::In),
            Param::new("hdr", headers_ty(), Direction::Out),
            Param::new("meta", metadata_ty(), Direction::InOut),
            Param::new("istd", Type::Struct(istd.into()), Direction::In),
        ],
        locals: Vec::new(),
        states: vec![
            ParserState {
                name: "start".into(),
                body: vec![extract(header("ethernet", "ethernet_t"))],
                transition: Transition::Select {
                    expr: ethernet("ether_type", 16),
                    cases: vec![SelectCase {
                        value: 0x0800,
                        next: "parse_ipv4".into(),
                    }],
                    default: "accept".into(),
                },
            },
            ParserState {
                name: "parse_ipv4".into(),
                body: vec![extract(header("ipv4", "ipv4_t"))],
                transition: Transition::Accept,
            },
        ],
    }
}

/// Deparser emitting both headers
pub fn deparser(name: &str, ostd: &str) -> Control {
    let pkt = Expr::path("pkt", Type::Packet);
    let emit = |h: Expr| Stmt::Call(MethodCall::new(pkt.clone(), "emit", vec![h]));
    Control {
        name: name.into(),
        params: vec![
            Param::new("pkt", Type::Packet, Direction::Out),
            Param::new("hdr", headers_ty(), Direction::In),
            Param::new("meta", metadata_ty(), Direction::In),
            Param::new("ostd", Type::Struct(ostd.into()), Direction::In),
        ],
        locals: Vec::new(),
        body: vec![
            emit(header("ethernet", "ethernet_t")),
            emit(header("ipv4", "ipv4_t")),
        ],
    }
}

/// Control with the four usual parameters and no behavior
pub fn empty_control(name: &str, istd: &str, ostd: &str) -> Control {
    Control {
        name: name.into(),
        params: vec![
            Param::new("hdr", headers_ty(), Direction::InOut),
            Param::new("meta", metadata_ty(), Direction::InOut),
            Param::new("istd", Type::Struct(istd.into()), Direction::In),
            Param::new("ostd", Type::Struct(ostd.into()), Direction::InOut),
        ],
        locals: Vec::new(),
        body: Vec::new(),
    }
}

/// `send(bit<32> port)`: forward to `port`
pub fn pna_send_action() -> Action {
    Action {
        name: "send".into(),
        params: vec![Param::new("port", Type::bits(32), Direction::None)],
        body: vec![Stmt::Call(MethodCall::free(
            "send_to_port",
            vec![Expr::path("port", Type::bits(32))],
        ))],
    }
}

/// `do_drop()`: drop the packet
pub fn pna_drop_action() -> Action {
    Action {
        name: "do_drop".into(),
        params: Vec::new(),
        body: vec![Stmt::Call(MethodCall::free("drop_packet", Vec::new()))],
    }
}

/// Table offering `send` and `do_drop`, defaulting to `do_drop`
pub fn table(name: &str, keys: Vec<Key>, entries: Vec<TableEntry>) -> Table {
    let mut table = Table::new(name);
    table.keys = keys;
    table.actions = ["send", "do_drop"]
        .iter()
        .map(|a| TableAction {
            name: a.to_string(),
            scope: ActionScope::TableAndDefault,
        })
        .collect();
    table.default_action = Some(ActionRef::bare("do_drop"));
    table.size = Some(1024);
    table.entries = entries;
    table
}

pub fn key(name: &str, expr: Expr, match_kind: MatchKind) -> Key {
    Key {
        name: name.into(),
        expr,
        match_kind,
    }
}

/// Const entry `<dst> : send(<port>)`
pub fn send_entry(dst: u64, port: u64) -> TableEntry {
    TableEntry {
        keys: vec![KeySetValue::Exact(dst)],
        action: ActionRef {
            name: "send".into(),
            args: vec![Expr::constant(port, 32)],
        },
        priority: None,
    }
}

/// `if (hdr.ipv4.isValid()) { <table>.apply(); }`
pub fn apply_if_ipv4(table: &str) -> Stmt {
    Stmt::if_else(
        Expr::is_valid(header("ipv4", "ipv4_t")),
        vec![Stmt::Apply(table.into())],
        Vec::new(),
    )
}

/// PNA main control holding `tables`, each applied when IPv4 is valid
pub fn pna_main_control(tables: Vec<Table>) -> Control {
    let mut control = empty_control(
        "MainControlImpl",
        "pna_main_input_metadata_t",
        "pna_main_output_metadata_t",
    );
    control.locals.push(Local::Action(pna_send_action()));
    control.locals.push(Local::Action(pna_drop_action()));
    for table in tables {
        control.body.push(apply_if_ipv4(&table.name));
        control.locals.push(Local::Table(table));
    }
    control
}

/// Forwarding table keyed on the IPv4 destination
pub fn forward_table(name: &str, entries: Vec<TableEntry>) -> Table {
    table(
        name,
        vec![key("hdr.ipv4.dst_addr", ipv4("dst_addr", 32), MatchKind::Exact)],
        entries,
    )
}

/// PNA program around `main_control`
pub fn pna_program_with(main_control: Control) -> Program {
    let mut declarations = types();
    declarations.push(Declaration::Parser(parser(
        "MainParserImpl",
        "pna_main_parser_input_metadata_t",
    )));
    declarations.push(Declaration::Control(empty_control(
        "PreControlImpl",
        "pna_pre_input_metadata_t",
        "pna_pre_output_metadata_t",
    )));
    declarations.push(Declaration::Control(main_control));
    declarations.push(Declaration::Control(deparser(
        "MainDeparserImpl",
        "pna_main_output_metadata_t",
    )));
    Program {
        declarations,
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

/// PNA program forwarding on the IPv4 destination
pub fn pna_program() -> Program {
    pna_program_with(pna_main_control(vec![forward_table(FORWARD_TABLE, Vec::new())]))
}

/// PSA program with an ingress forwarding table and empty egress blocks
pub fn psa_program() -> Program {
    let ostd = Type::Struct("psa_ingress_output_metadata_t".into());
    let send = Action {
        name: "send".into(),
        params: vec![Param::new("port", Type::bits(32), Direction::None)],
        body: vec![Stmt::Call(MethodCall::free(
            "send_to_port",
            vec![Expr::path("ostd", ostd.clone()), Expr::path("port", Type::bits(32))],
        ))],
    };
    let drop = Action {
        name: "do_drop".into(),
        params: Vec::new(),
        body: vec![Stmt::Call(MethodCall::free(
            "ingress_drop",
            vec![Expr::path("ostd", ostd)],
        ))],
    };
    let mut ingress = empty_control(
        "IngressImpl",
        "psa_ingress_input_metadata_t",
        "psa_ingress_output_metadata_t",
    );
    let table = forward_table(FORWARD_TABLE, Vec::new());
    ingress.body.push(apply_if_ipv4(&table.name));
    ingress.locals = vec![Local::Action(send), Local::Action(drop), Local::Table(table)];

    let mut declarations = types();
    declarations.push(Declaration::Parser(parser(
        "IngressParserImpl",
        "psa_ingress_parser_input_metadata_t",
    )));
    declarations.push(Declaration::Control(ingress));
    declarations.push(Declaration::Control(deparser(
        "IngressDeparserImpl",
        "psa_ingress_output_metadata_t",
    )));
    declarations.push(Declaration::Parser(parser(
        "EgressParserImpl",
        "psa_egress_parser_input_metadata_t",
    )));
    declarations.push(Declaration::Control(empty_control(
        "EgressImpl",
        "psa_egress_input_metadata_t",
        "psa_egress_output_metadata_t",
    )));
    declarations.push(Declaration::Control(deparser(
        "EgressDeparserImpl",
        "psa_egress_output_metadata_t",
    )));
    Program {
        declarations,
        main: Some(PackageInstance {
            type_name: "PSA_SWITCH".into(),
            args: vec![
                "IngressParserImpl".into(),
                "IngressImpl".into(),
                "IngressDeparserImpl".into(),
                "EgressParserImpl".into(),
                "EgressImpl".into(),
                "EgressDeparserImpl".into(),
            ],
        }),
    }
}

/// Two tables matching on the same IPv4 destination expression
pub fn shared_key_program() -> Program {
    let routes = forward_table("routes", Vec::new());
    let acl = table(
        "acl",
        vec![
            key("hdr.ipv4.dst_addr", ipv4("dst_addr", 32), MatchKind::Ternary),
            key("hdr.ipv4.protocol", ipv4("protocol", 8), MatchKind::Exact),
        ],
        Vec::new(),
    );
    pna_program_with(pna_main_control(vec![routes, acl]))
}

/// Main control loops up to a bound read from packet metadata
pub fn runtime_loop_program() -> Program {
    let mut control = pna_main_control(vec![forward_table(FORWARD_TABLE, Vec::new())]);
    control.body.push(Stmt::For {
        var: "i".into(),
        ty: Type::bits(32),
        start: Expr::constant(0, 32),
        end: meta("limit", 32),
        body: vec![Stmt::assign(
            meta("hops", 32),
            Expr::binary(
                dpdkc::ir::BinOp::Add,
                meta("hops", 32),
                Expr::constant(1, 32),
            ),
        )],
    });
    pna_program_with(control)
}
