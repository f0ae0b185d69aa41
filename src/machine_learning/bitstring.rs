//! Mapping from classes to measurement outcomes

use std::fmt;

use crate::machine_learning::core::ConfigurationError;

/// A full-register measurement outcome chosen to represent one class
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bitstring {
    /// Outcome given as its integer value
    Code(usize),
    /// Outcome given as a binary string, most significant bit (qubit 0) first
    Binary(String),
}

impl From<usize> for Bitstring {
    fn from(code: usize) -> Self {
        Bitstring::Code(code)
    }
}

impl From<&str> for Bitstring {
    fn from(bits: &str) -> Self {
        Bitstring::Binary(bits.to_string())
    }
}

impl From<String> for Bitstring {
    fn from(bits: String) -> Self {
        Bitstring::Binary(bits)
    }
}

/// Ordered outcome codes, one per class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitstringLabels {
    codes: Vec<usize>,
    qubit_count: usize,
}

impl BitstringLabels {
    /// Validate and convert the class outcomes of a `qubit_count`-qubit model.
    ///
    /// The list must be non-empty and homogeneous: all integer codes or all
    /// binary strings of one length.
    pub fn parse(bitstr: &[Bitstring], qubit_count: usize) -> Result<Self, ConfigurationError> {
        let first = bitstr.first().ok_or_else(|| {
            ConfigurationError::InvalidValue("at least one bitstring is required".to_string())
        })?;

        let codes = match first {
            Bitstring::Code(_) => bitstr
                .iter()
                .map(|b| match b {
                    Bitstring::Code(code) => Ok(*code),
                    Bitstring::Binary(_) => Err(ConfigurationError::TypeMismatch(
                        "all bitstrings must have the same type".to_string(),
                    )),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Bitstring::Binary(reference) => {
                let width = reference.len();
                bitstr
                    .iter()
                    .map(|b| match b {
                        Bitstring::Binary(bits) if bits.len() == width => parse_binary(bits),
                        Bitstring::Binary(bits) => Err(ConfigurationError::TypeMismatch(format!(
                            "bitstring {:?} has length {}, expected {}",
                            bits,
                            bits.len(),
                            width
                        ))),
                        Bitstring::Code(_) => Err(ConfigurationError::TypeMismatch(
                            "all bitstrings must have the same type".to_string(),
                        )),
                    })
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        let outcome_count = 1usize << qubit_count;
        if let Some(code) = codes.iter().find(|&&code| code >= outcome_count) {
            return Err(ConfigurationError::InvalidValue(format!(
                "outcome {} does not exist on a {}-qubit register",
                code, qubit_count
            )));
        }

        Ok(BitstringLabels { codes, qubit_count })
    }

    /// Outcome codes in class order
    pub fn codes(&self) -> &[usize] {
        &self.codes
    }

    /// Number of classes
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Codes rendered as zero-padded binary strings
    pub fn to_binary_strings(&self) -> Vec<String> {
        self.codes
            .iter()
            .map(|code| format!("{:0width$b}", code, width = self.qubit_count))
            .collect()
    }
}

impl fmt::Display for BitstringLabels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.to_binary_strings().join(", "))
    }
}

fn parse_binary(bits: &str) -> Result<usize, ConfigurationError> {
    if bits.is_empty() {
        return Err(ConfigurationError::TypeMismatch("empty bitstring".to_string()));
    }
    usize::from_str_radix(bits, 2).map_err(|_| {
        ConfigurationError::TypeMismatch(format!("{:?} is not a binary string", bits))
    })
}
