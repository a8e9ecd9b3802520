use serde_json::Value;

use appshell_core::ErrorCode;

/// Typed view over a call's argument list.
///
/// Every accessor reports `ErrorCode::InvalidParams` on a missing or
/// mistyped argument and logs which call and position were at fault.
pub struct Args<'a> {
    name: &'a str,
    values: &'a [Value],
}

impl<'a> Args<'a> {
    pub fn new(name: &'a str, values: &'a [Value]) -> Self {
        Self { name, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Require exactly `count` arguments.
    pub fn expect_len(&self, count: usize) -> Result<(), ErrorCode> {
        if self.values.len() != count {
            log::warn!(
                "{}: expected {} argument(s), got {}",
                self.name,
                count,
                self.values.len()
            );
            return Err(ErrorCode::InvalidParams);
        }
        Ok(())
    }

    fn invalid(&self, index: usize, wanted: &str) -> ErrorCode {
        log::warn!(
            "{}: argument {} is not a {} ({:?})",
            self.name,
            index,
            wanted,
            self.values.get(index)
        );
        ErrorCode::InvalidParams
    }

    pub fn string(&self, index: usize) -> Result<&'a str, ErrorCode> {
        self.values
            .get(index)
            .and_then(Value::as_str)
            .ok_or_else(|| self.invalid(index, "string"))
    }

    /// Like `string`, but `null` reads as `""`.
    pub fn string_or_empty(&self, index: usize) -> Result<&'a str, ErrorCode> {
        match self.values.get(index) {
            Some(Value::Null) => Ok(""),
            _ => self.string(index),
        }
    }

    pub fn bool(&self, index: usize) -> Result<bool, ErrorCode> {
        self.values
            .get(index)
            .and_then(Value::as_bool)
            .ok_or_else(|| self.invalid(index, "bool"))
    }

    pub fn int(&self, index: usize) -> Result<i64, ErrorCode> {
        let value = self.values.get(index);
        value
            .and_then(Value::as_i64)
            .or_else(|| {
                value
                    .and_then(Value::as_f64)
                    .filter(|f| f.fract() == 0.0)
                    .map(|f| f as i64)
            })
            .ok_or_else(|| self.invalid(index, "integer"))
    }

    pub fn u32(&self, index: usize) -> Result<u32, ErrorCode> {
        let value = self.int(index)?;
        u32::try_from(value).map_err(|_| self.invalid(index, "u32"))
    }

    pub fn number(&self, index: usize) -> Result<f64, ErrorCode> {
        self.values
            .get(index)
            .and_then(Value::as_f64)
            .ok_or_else(|| self.invalid(index, "number"))
    }

    /// A list of strings, given either as an array or as one string
    /// separated by spaces, commas or semicolons.
    pub fn string_list(&self, index: usize) -> Result<Vec<String>, ErrorCode> {
        match self.values.get(index) {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| self.invalid(index, "string array"))
                })
                .collect(),
            Some(Value::String(s)) => Ok(s
                .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect()),
            Some(Value::Null) => Ok(Vec::new()),
            _ => Err(self.invalid(index, "string list")),
        }
    }
}
