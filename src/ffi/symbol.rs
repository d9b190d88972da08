//! Export Symbol Resolution
//!
//! Each module exports `<prefix>_<short name>`, where the short name is the
//! part after the last dot. ASCII names use [`ASCII_EXPORT_PREFIX`]; other
//! names are Punycode-encoded (RFC 3492, `-` replaced by `_`) and use
//! [`NONASCII_EXPORT_PREFIX`].

use tracing::debug;

use super::{ExportLookup, RawInitFn};
use crate::error::{ImportError, ImportResult, RaisedError};

pub const ASCII_EXPORT_PREFIX: &str = "ModInit";
pub const NONASCII_EXPORT_PREFIX: &str = "ModInitU";

/// The export symbol of one module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSymbol {
    prefix: &'static str,
    encoded_name: String,
}

impl ExportSymbol {
    /// Compute the export symbol for a fully qualified module name
    pub fn for_module(name: &str) -> ImportResult<Self> {
        let short_name = name.rsplit('.').next().unwrap_or(name);

        if short_name.is_ascii() {
            return Ok(Self {
                prefix: ASCII_EXPORT_PREFIX,
                encoded_name: short_name.to_string(),
            });
        }

        let encoded = punycode_encode(short_name).ok_or_else(|| {
            ImportError::Exception(RaisedError::new(
                "UnicodeError",
                format!("cannot encode module name '{}' as punycode", short_name),
            ))
        })?;
        Ok(Self {
            prefix: NONASCII_EXPORT_PREFIX,
            encoded_name: encoded.replace('-', "_"),
        })
    }

    pub fn prefix(&self) -> &'static str {
        self.prefix
    }

    pub fn encoded_name(&self) -> &str {
        &self.encoded_name
    }

    /// Whether the name needed Punycode, which only multi-phase modules may use
    pub fn is_nonascii(&self) -> bool {
        self.prefix == NONASCII_EXPORT_PREFIX
    }

    /// Full symbol name
    pub fn symbol(&self) -> String {
        format!("{}_{}", self.prefix, self.encoded_name)
    }
}

/// Finds a module's init function in a loaded library
pub struct ExportSymbolResolver;

impl ExportSymbolResolver {
    pub fn resolve(
        library: &dyn ExportLookup,
        name: &str,
    ) -> ImportResult<(RawInitFn, ExportSymbol)> {
        let symbol = ExportSymbol::for_module(name)?;
        let symbol_name = symbol.symbol();

        match library.export(&symbol_name) {
            Some(init) => {
                debug!(module = name, symbol = %symbol_name, "resolved export function");
                Ok((init, symbol))
            }
            None => Err(ImportError::SymbolNotFound {
                name: name.to_string(),
                path: library.path().display().to_string(),
                prefix: symbol.prefix,
                short_name: symbol.encoded_name,
            }),
        }
    }
}

const BASE: u32 = 36;
const TMIN: u32 = 1;
const TMAX: u32 = 26;
const SKEW: u32 = 38;
const DAMP: u32 = 700;
const INITIAL_BIAS: u32 = 72;
const INITIAL_N: u32 = 128;

fn adapt(mut delta: u32, num_points: u32, first_time: bool) -> u32 {
    delta /= if first_time { DAMP } else { 2 };
    delta += delta / num_points;
    let mut k = 0;
    while delta > ((BASE - TMIN) * TMAX) / 2 {
        delta /= BASE - TMIN;
        k += BASE;
    }
    k + (((BASE - TMIN + 1) * delta) / (delta + SKEW))
}

fn encode_digit(d: u32) -> char {
    match d {
        0..=25 => (b'a' + d as u8) as char,
        _ => (b'0' + (d - 26) as u8) as char,
    }
}

/// RFC 3492 Punycode encoding, without any `xn--` prefix.
///
/// Returns `None` on arithmetic overflow.
pub fn punycode_encode(input: &str) -> Option<String> {
    let code_points: Vec<u32> = input.chars().map(|c| c as u32).collect();
    let mut output: String = input.chars().filter(|c| c.is_ascii()).collect();

    let basic = output.len() as u32;
    let total = code_points.len() as u32;
    if basic > 0 {
        output.push('-');
    }

    let mut n = INITIAL_N;
    let mut delta: u32 = 0;
    let mut bias = INITIAL_BIAS;
    let mut handled = basic;

    while handled < total {
        let m = code_points.iter().copied().filter(|&c| c >= n).min()?;
        delta = delta.checked_add((m - n).checked_mul(handled + 1)?)?;
        n = m;

        for &c in &code_points {
            if c < n {
                delta = delta.checked_add(1)?;
            }
            if c == n {
                let mut q = delta;
                let mut k = BASE;
                loop {
                    let t = if k <= bias {
                        TMIN
                    } else if k >= bias + TMAX {
                        TMAX
                    } else {
                        k - bias
                    };
                    if q < t {
                        break;
                    }
                    output.push(encode_digit(t + (q - t) % (BASE - t)));
                    q = (q - t) / (BASE - t);
                    k += BASE;
                }
                output.push(encode_digit(q));
                bias = adapt(delta, handled + 1, handled == basic);
                delta = 0;
                handled += 1;
            }
        }

        delta = delta.checked_add(1)?;
        n = n.checked_add(1)?;
    }

    Some(output)
}
