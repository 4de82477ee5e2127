//! # Target Architectures
//!
//! The two package models the backend accepts, the block roles each one binds
//! and the built-in metadata structs the target flattens into the single
//! metadata struct `m`.

use crate::error::Error;
use crate::ir::{Field, Type};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported architecture variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchVariant {
    /// Portable Switch Architecture
    Psa,
    /// Portable NIC Architecture
    #[default]
    Pna,
}

impl ArchVariant {
    /// Package type instantiated as `main`
    pub fn package_type(self) -> &'static str {
        match self {
            ArchVariant::Psa => "PSA_SWITCH",
            ArchVariant::Pna => "PNA_NIC",
        }
    }

    /// Variant declared by a package type name
    pub fn from_package(type_name: &str) -> Option<Self> {
        match type_name {
            "PSA_SWITCH" => Some(ArchVariant::Psa),
            "PNA_NIC" => Some(ArchVariant::Pna),
            _ => None,
        }
    }

    /// Block roles in package parameter order
    pub fn roles(self) -> &'static [BlockRole] {
        match self {
            ArchVariant::Psa => &[
                BlockRole::IngressParser,
                BlockRole::Ingress,
                BlockRole::IngressDeparser,
                BlockRole::EgressParser,
                BlockRole::Egress,
                BlockRole::EgressDeparser,
            ],
            ArchVariant::Pna => &[
                BlockRole::MainParser,
                BlockRole::PreControl,
                BlockRole::MainControl,
                BlockRole::MainDeparser,
            ],
        }
    }

    /// Metadata field holding the input port, loaded by `rx`
    pub fn rx_field(self) -> &'static str {
        match self {
            ArchVariant::Psa => "psa_ingress_input_metadata_ingress_port",
            ArchVariant::Pna => "pna_main_input_metadata_input_port",
        }
    }

    /// Metadata field holding the output port, read by `tx`
    pub fn tx_field(self) -> &'static str {
        match self {
            ArchVariant::Psa => "psa_ingress_output_metadata_egress_port",
            ArchVariant::Pna => "pna_main_output_metadata_output_port",
        }
    }

    /// Fields the target always expects in `m`
    pub fn fixed_fields(self) -> Vec<Field> {
        let mut fields = vec![
            Field::new(self.rx_field(), Type::bits(32)),
            Field::new(self.tx_field(), Type::bits(32)),
        ];
        if self == ArchVariant::Pna {
            fields.push(Field::new(PNA_PASS_FIELD, Type::bits(32)));
        }
        fields
    }

    /// Built-in metadata struct layouts for this variant
    pub fn standard_metadata(self) -> &'static [(&'static str, &'static [(&'static str, u32)])] {
        match self {
            ArchVariant::Psa => PSA_METADATA,
            ArchVariant::Pna => PNA_METADATA,
        }
    }

    /// Fields of a built-in metadata struct
    pub fn standard_struct(self, type_name: &str) -> Option<Vec<Field>> {
        self.standard_metadata()
            .iter()
            .find(|(name, _)| *name == type_name)
            .map(|(_, fields)| {
                fields
                    .iter()
                    .map(|(name, width)| {
                        let ty = if *width == 0 {
                            Type::Bool
                        } else {
                            Type::bits(*width)
                        };
                        Field::new(*name, ty)
                    })
                    .collect()
            })
    }
}

impl fmt::Display for ArchVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArchVariant::Psa => "psa",
            ArchVariant::Pna => "pna",
        })
    }
}

impl FromStr for ArchVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "psa" => Ok(ArchVariant::Psa),
            "pna" => Ok(ArchVariant::Pna),
            _ => Err(Error::UnknownArchitecture { name: s.to_string() }),
        }
    }
}

/// Role a parser or control plays in the package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BlockRole {
    /// PNA `MainParserT`
    MainParser,
    /// PNA `PreControlT`
    PreControl,
    /// PNA `MainControlT`
    MainControl,
    /// PNA `MainDeparserT`
    MainDeparser,
    /// PSA ingress parser
    IngressParser,
    /// PSA ingress control
    Ingress,
    /// PSA ingress deparser
    IngressDeparser,
    /// PSA egress parser
    EgressParser,
    /// PSA egress control
    Egress,
    /// PSA egress deparser
    EgressDeparser,
}

impl BlockRole {
    /// Parser roles
    pub fn is_parser(self) -> bool {
        matches!(
            self,
            BlockRole::MainParser | BlockRole::IngressParser | BlockRole::EgressParser
        )
    }

    /// Deparser roles
    pub fn is_deparser(self) -> bool {
        matches!(
            self,
            BlockRole::MainDeparser | BlockRole::IngressDeparser | BlockRole::EgressDeparser
        )
    }

    /// Match-action stages
    pub fn is_pipeline(self) -> bool {
        !self.is_parser() && !self.is_deparser()
    }
}

impl fmt::Display for BlockRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BlockRole::MainParser => "main_parser",
            BlockRole::PreControl => "pre_control",
            BlockRole::MainControl => "main_control",
            BlockRole::MainDeparser => "main_deparser",
            BlockRole::IngressParser => "ingress_parser",
            BlockRole::Ingress => "ingress",
            BlockRole::IngressDeparser => "ingress_deparser",
            BlockRole::EgressParser => "egress_parser",
            BlockRole::Egress => "egress",
            BlockRole::EgressDeparser => "egress_deparser",
        })
    }
}

/// PNA recirculation pass number, written by `recircid`
pub const PNA_PASS_FIELD: &str = "pna_main_input_metadata_pass";

/// PNA packet direction, served from the `direction` register array
pub const PNA_DIRECTION_FIELDS: &[&str] = &[
    "pna_main_input_metadata_direction",
    "pna_main_parser_input_metadata_direction",
    "pna_pre_input_metadata_direction",
];

/// Field set by the table lookup for direct resources
pub const TABLE_ENTRY_INDEX_FIELD: &str = "table_entry_index";

/// Name of the flattened metadata parameter
pub const METADATA_PARAM: &str = "m";

/// Name of the flattened headers parameter
pub const HEADERS_PARAM: &str = "h";

/// Flattened field name for `<struct>.<field>` of a built-in metadata struct
pub fn flattened_name(struct_type: &str, field: &str) -> String {
    let base = struct_type.strip_suffix("_t").unwrap_or(struct_type);
    format!("{}_{}", base, field)
}

// Width 0 marks a `bool` field.
const PNA_METADATA: &[(&str, &[(&str, u32)])] = &[
    (
        "pna_main_parser_input_metadata_t",
        &[
            ("direction", 32),
            ("pass", 32),
            ("loopedback", 0),
            ("input_port", 32),
        ],
    ),
    (
        "pna_pre_input_metadata_t",
        &[
            ("input_port", 32),
            ("parser_error", 16),
            ("direction", 32),
            ("pass", 32),
            ("loopedback", 0),
        ],
    ),
    ("pna_pre_output_metadata_t", &[("decrypt", 0)]),
    (
        "pna_main_input_metadata_t",
        &[
            ("direction", 32),
            ("pass", 32),
            ("loopedback", 0),
            ("timestamp", 64),
            ("parser_error", 16),
            ("class_of_service", 8),
            ("input_port", 32),
        ],
    ),
    ("pna_main_output_metadata_t", &[("class_of_service", 8)]),
];

const PSA_METADATA: &[(&str, &[(&str, u32)])] = &[
    (
        "psa_ingress_parser_input_metadata_t",
        &[("ingress_port", 32), ("packet_path", 32)],
    ),
    (
        "psa_ingress_input_metadata_t",
        &[
            ("ingress_port", 32),
            ("packet_path", 32),
            ("ingress_timestamp", 64),
            ("parser_error", 16),
        ],
    ),
    (
        "psa_ingress_output_metadata_t",
        &[
            ("class_of_service", 8),
            ("clone", 0),
            ("clone_session_id", 16),
            ("drop", 0),
            ("resubmit", 0),
            ("multicast_group", 32),
            ("egress_port", 32),
        ],
    ),
    (
        "psa_egress_parser_input_metadata_t",
        &[("egress_port", 32), ("packet_path", 32)],
    ),
    (
        "psa_egress_input_metadata_t",
        &[
            ("class_of_service", 8),
            ("egress_port", 32),
            ("packet_path", 32),
            ("instance", 16),
            ("egress_timestamp", 64),
            ("parser_error", 16),
        ],
    ),
    (
        "psa_egress_output_metadata_t",
        &[("clone", 0), ("clone_session_id", 16), ("drop", 0)],
    ),
    ("psa_egress_deparser_input_metadata_t", &[("egress_port", 32)]),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arch_from_str() {
        assert_eq!("PNA".parse::<ArchVariant>(), Ok(ArchVariant::Pna));
        assert_eq!("psa".parse::<ArchVariant>(), Ok(ArchVariant::Psa));
        assert!("v1model".parse::<ArchVariant>().is_err());
    }

    #[test]
    fn test_flattened_name() {
        assert_eq!(
            flattened_name("pna_main_input_metadata_t", "input_port"),
            ArchVariant::Pna.rx_field()
        );
    }

    #[test]
    fn test_standard_struct_bool_fields() {
        let fields = ArchVariant::Psa
            .standard_struct("psa_ingress_output_metadata_t")
            .unwrap_or_default();
        assert_eq!(
            fields.iter().find(|f| f.name == "drop").map(|f| &f.ty),
            Some(&Type::Bool)
        );
    }

    #[test]
    fn test_pna_fixed_fields_include_pass() {
        let names: Vec<_> = ArchVariant::Pna
            .fixed_fields()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert!(names.iter().any(|n| n == PNA_PASS_FIELD));
        assert!(!ArchVariant::Psa
            .fixed_fields()
            .iter()
            .any(|f| f.name == PNA_PASS_FIELD));
    }
}
