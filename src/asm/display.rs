//! Text form of the assembly program

use super::{AluOp, AsmAction, AsmProgram, AsmStmt, AsmStruct, AsmTable, CmpOp, Operand, RegArray};
use super::DEFAULT_LEARNER_TIMEOUTS;
use crate::arch::{HEADERS_PARAM, METADATA_PARAM};
use crate::passes::lower::ACTION_ARGS_PARAM;
use std::fmt;

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Meta(name) => write!(f, "{}.{}", METADATA_PARAM, name),
            Operand::Header { instance, field } => {
                write!(f, "{}.{}.{}", HEADERS_PARAM, instance, field)
            }
            Operand::ActionArg(name) => write!(f, "{}.{}", ACTION_ARGS_PARAM, name),
            Operand::Imm(v) => write!(f, "0x{:x}", v),
        }
    }
}

impl CmpOp {
    fn mnemonic(self) -> &'static str {
        match self {
            CmpOp::Eq => "jmpeq",
            CmpOp::Neq => "jmpneq",
            CmpOp::Lt => "jmplt",
            CmpOp::Gt => "jmpgt",
        }
    }
}

impl AluOp {
    fn mnemonic(self) -> &'static str {
        match self {
            AluOp::Add => "add",
            AluOp::Sub => "sub",
            AluOp::And => "and",
            AluOp::Or => "or",
            AluOp::Xor => "xor",
            AluOp::Shl => "shl",
            AluOp::Shr => "shr",
        }
    }
}

impl fmt::Display for AsmStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsmStmt::Label(l) => write!(f, "{} :", l),
            AsmStmt::Jmp(l) => write!(f, "jmp {}", l),
            AsmStmt::JmpCmp {
                op,
                target,
                left,
                right,
            } => write!(f, "{} {} {} {}", op.mnemonic(), target, left, right),
            AsmStmt::JmpValid { target, header } => {
                write!(f, "jmpv {} {}.{}", target, HEADERS_PARAM, header)
            }
            AsmStmt::JmpInvalid { target, header } => {
                write!(f, "jmpnv {} {}.{}", target, HEADERS_PARAM, header)
            }
            AsmStmt::JmpHit(l) => write!(f, "jmph {}", l),
            AsmStmt::JmpMiss(l) => write!(f, "jmpnh {}", l),
            AsmStmt::Mov { dst, src } => write!(f, "mov {} {}", dst, src),
            AsmStmt::Alu { op, dst, src } => write!(f, "{} {} {}", op.mnemonic(), dst, src),
            AsmStmt::Table(t) => write!(f, "table {}", t),
            AsmStmt::Extract(h) => write!(f, "extract {}.{}", HEADERS_PARAM, h),
            AsmStmt::Emit(h) => write!(f, "emit {}.{}", HEADERS_PARAM, h),
            AsmStmt::Validate(h) => write!(f, "validate {}.{}", HEADERS_PARAM, h),
            AsmStmt::Invalidate(h) => write!(f, "invalidate {}.{}", HEADERS_PARAM, h),
            AsmStmt::Rx(o) => write!(f, "rx {}", o),
            AsmStmt::Tx(o) => write!(f, "tx {}", o),
            AsmStmt::Drop => f.write_str("drop"),
            AsmStmt::Return => f.write_str("return"),
            AsmStmt::RegRead { dst, reg, index } => write!(f, "regrd {} {} {}", dst, reg, index),
            AsmStmt::RegWrite { reg, index, src } => write!(f, "regwr {} {} {}", reg, index, src),
            AsmStmt::RegAdd { reg, index, src } => write!(f, "regadd {} {} {}", reg, index, src),
            AsmStmt::EntryId(o) => write!(f, "entryid {}", o),
            AsmStmt::Learn { action, arg } => match arg {
                Some(arg) => write!(f, "learn {} {}", action, arg),
                None => write!(f, "learn {}", action),
            },
            AsmStmt::RecircId(o) => write!(f, "recircid {}", o),
            AsmStmt::Recirculate => f.write_str("recirculate"),
            AsmStmt::Mirror { slot, session } => write!(f, "mirror {} {}", slot, session),
        }
    }
}

impl fmt::Display for AsmStruct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "struct {} {{", self.name)?;
        for field in &self.fields {
            writeln!(f, "\tbit<{}> {}", field.width, field.name)?;
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for RegArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "regarray {} size 0x{:x} initval {}",
            self.name, self.size, self.init
        )
    }
}

fn write_body(f: &mut fmt::Formatter<'_>, body: &[AsmStmt]) -> fmt::Result {
    for stmt in body {
        writeln!(f, "\t{}", stmt)?;
    }
    Ok(())
}

impl fmt::Display for AsmAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.args {
            Some(args) => writeln!(f, "action {} args instanceof {} {{", self.name, args)?,
            None => writeln!(f, "action {} args none {{", self.name)?,
        }
        write_body(f, &self.body)?;
        writeln!(f, "}}")
    }
}

impl fmt::Display for AsmTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.learner { "learner" } else { "table" };
        writeln!(f, "{} {} {{", kind, self.name)?;
        if !self.keys.is_empty() {
            writeln!(f, "\tkey {{")?;
            for (operand, match_kind) in &self.keys {
                writeln!(f, "\t\t{} {}", operand, match_kind)?;
            }
            writeln!(f, "\t}}")?;
        }
        writeln!(f, "\tactions {{")?;
        for (action, table_only) in &self.actions {
            if *table_only {
                writeln!(f, "\t\t{} @tableonly", action)?;
            } else {
                writeln!(f, "\t\t{}", action)?;
            }
        }
        writeln!(f, "\t}}")?;
        write!(f, "\tdefault_action {} args", self.default_action)?;
        if self.default_args.is_empty() {
            f.write_str(" none")?;
        }
        for (param, value) in &self.default_args {
            write!(f, " {} 0x{:x}", param, value)?;
        }
        if self.const_default {
            f.write_str(" const")?;
        }
        writeln!(f)?;
        writeln!(f, "\tsize 0x{:x}", self.size)?;
        if self.learner {
            writeln!(f, "\ttimeout {{")?;
            for t in DEFAULT_LEARNER_TIMEOUTS {
                writeln!(f, "\t\t{}", t)?;
            }
            writeln!(f, "\t}}")?;
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for AsmProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for st in &self.header_types {
            writeln!(f, "{}", st)?;
        }
        for (instance, ty) in &self.headers {
            writeln!(f, "header {} instanceof {}", instance, ty)?;
        }
        if !self.headers.is_empty() {
            writeln!(f)?;
        }
        for st in &self.structs {
            writeln!(f, "{}", st)?;
        }
        if let Some(m) = &self.metadata {
            writeln!(f, "metadata instanceof {}", m)?;
            writeln!(f)?;
        }
        for reg in &self.regarrays {
            write!(f, "{}", reg)?;
        }
        if !self.regarrays.is_empty() {
            writeln!(f)?;
        }
        for action in &self.actions {
            writeln!(f, "{}", action)?;
        }
        for table in &self.tables {
            writeln!(f, "{}", table)?;
        }
        writeln!(f, "apply {{")?;
        write_body(f, &self.apply)?;
        writeln!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::AsmField;
    use crate::ir::MatchKind;

    #[test]
    fn test_stmt_text() {
        let jump = AsmStmt::JmpCmp {
            op: CmpOp::Neq,
            target: "LABEL_FALSE_0".into(),
            left: Operand::Header {
                instance: "ipv4".into(),
                field: "ttl".into(),
            },
            right: Operand::Imm(0),
        };
        assert_eq!(jump.to_string(), "jmpneq LABEL_FALSE_0 h.ipv4.ttl 0x0");
        assert_eq!(AsmStmt::Label("L".into()).to_string(), "L :");
        assert_eq!(
            AsmStmt::Mov {
                dst: Operand::Meta("x".into()),
                src: Operand::ActionArg("port".into())
            }
            .to_string(),
            "mov m.x t.port"
        );
    }

    #[test]
    fn test_table_text() {
        let table = AsmTable {
            name: "fwd".into(),
            keys: vec![(Operand::Meta("k".into()), MatchKind::Exact)],
            actions: vec![("set_port".into(), false), ("drop_1".into(), false)],
            default_action: "set_port".into(),
            default_args: vec![("port".into(), 1)],
            const_default: true,
            size: 0x400,
            learner: false,
            entries: Vec::new(),
        };
        let text = table.to_string();
        assert!(text.starts_with("table fwd {\n\tkey {\n\t\tm.k exact\n\t}\n"));
        assert!(text.contains("\tdefault_action set_port args port 0x1 const\n"));
        assert!(text.contains("\tsize 0x400\n"));
    }

    #[test]
    fn test_program_sections() {
        let program = AsmProgram {
            header_types: vec![AsmStruct {
                name: "ethernet_t".into(),
                fields: vec![AsmField::new("dst", 48)],
            }],
            headers: vec![("ethernet".into(), "ethernet_t".into())],
            metadata: Some("main_metadata_t".into()),
            structs: vec![AsmStruct {
                name: "main_metadata_t".into(),
                fields: Vec::new(),
            }],
            apply: vec![AsmStmt::Extract("ethernet".into())],
            ..AsmProgram::default()
        };
        let text = program.to_string();
        assert!(text.contains("struct ethernet_t {\n\tbit<48> dst\n}\n"));
        assert!(text.contains("header ethernet instanceof ethernet_t\n"));
        assert!(text.contains("metadata instanceof main_metadata_t\n"));
        assert!(text.ends_with("apply {\n\textract h.ethernet\n}\n"));
    }
}
