//! SECS-II data items: an immutable tree of typed values with variable
//! placeholders.
//!
//! Every node holds either concrete values or named variables that can be
//! substituted later with [`Item::fill`]. Lists additionally support the
//! ellipsis variable `...`, a repetition marker that clones the slots before
//! it when filled with a repeat count.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::value::Value;

/// Upper bound on an item's encoded payload length (3-byte length field).
pub const MAX_BYTE_SIZE: usize = (1 << 24) - 1;

#[derive(Debug, thiserror::Error)]
pub enum ItemError {
    #[error("item byte length exceeds the 3-byte length field limit")]
    SizeLimitExceeded,
    #[error("invalid variable name {0:?}")]
    InvalidVariableName(String),
    #[error("duplicated variable name {0:?}")]
    DuplicateVariable(String),
    #[error("invalid byte size {0}")]
    InvalidByteSize(u8),
    #[error("value overflow in {0} item")]
    ValueOverflow(&'static str),
    #[error("invalid value type for {0} item")]
    InvalidValueType(&'static str),
    #[error("non-ASCII character in ASCII item")]
    NonAscii,
    #[error("float value must be finite")]
    NonFiniteFloat,
    #[error("invalid fill-in string length bounds")]
    InvalidLengthBounds,
    #[error("fill-in string length out of bounds")]
    FillLengthOverflow,
    #[error("invalid binary literal {0:?}")]
    InvalidBinaryLiteral(String),
    #[error("ellipsis cannot be the first item in a list")]
    EllipsisFirst,
    #[error("a list can contain at most one ellipsis")]
    MultipleEllipsis,
    #[error("ellipsis repeat count must be a non-negative integer")]
    InvalidEllipsisCount,
}

/// A SECS-II data item.
///
/// `Empty` is a sentinel used for parse/decode failures and for the body of
/// header-only messages; it never appears on the wire as an item header.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Empty,
    List(ListItem),
    Ascii(AsciiItem),
    Binary(BinaryItem),
    Boolean(BooleanItem),
    Int(IntItem),
    Uint(UintItem),
    Float(FloatItem),
}

/// List of child items; size counts direct slots, placeholders included.
#[derive(Debug, Clone, PartialEq)]
pub struct ListItem {
    values: Vec<Item>,
    variables: Vec<(usize, String)>,
}

/// ASCII string item: either a 7-bit literal or a single length-bounded
/// variable. The two modes are mutually exclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct AsciiItem {
    body: AsciiBody,
}

#[derive(Debug, Clone, PartialEq)]
enum AsciiBody {
    Literal(String),
    Variable {
        name: String,
        min_length: usize,
        max_length: Option<usize>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryItem {
    values: Vec<u8>,
    variables: Vec<(usize, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BooleanItem {
    values: Vec<bool>,
    variables: Vec<(usize, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntItem {
    byte_size: u8,
    values: Vec<i64>,
    variables: Vec<(usize, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UintItem {
    byte_size: u8,
    values: Vec<u64>,
    variables: Vec<(usize, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FloatItem {
    byte_size: u8,
    values: Vec<f64>,
    variables: Vec<(usize, String)>,
}

impl Item {
    /// Creates a list item. Each value is a child [`Item`] or a variable
    /// name; the ellipsis `...` (optionally indexed) may appear anywhere but
    /// the first slot, at most once per list. Variable names must be unique
    /// across the whole subtree.
    pub fn list(values: Vec<Value>) -> Result<Item, ItemError> {
        list_from_values(values).map(Item::List)
    }

    /// Creates an ASCII literal item. All characters must be 7-bit ASCII.
    pub fn ascii(value: &str) -> Result<Item, ItemError> {
        if value.len() > MAX_BYTE_SIZE {
            return Err(ItemError::SizeLimitExceeded);
        }
        if value.chars().any(|c| !c.is_ascii()) {
            return Err(ItemError::NonAscii);
        }
        Ok(Item::Ascii(AsciiItem {
            body: AsciiBody::Literal(value.to_string()),
        }))
    }

    /// Creates an ASCII variable item whose fill-in string length must lie in
    /// `[min_length, max_length]`; `None` means no upper bound.
    pub fn ascii_variable(
        name: &str,
        min_length: usize,
        max_length: Option<usize>,
    ) -> Result<Item, ItemError> {
        if !is_valid_var_name(name) {
            return Err(ItemError::InvalidVariableName(name.to_string()));
        }
        if let Some(max) = max_length {
            if min_length > max {
                return Err(ItemError::InvalidLengthBounds);
            }
        }
        Ok(Item::Ascii(AsciiItem {
            body: AsciiBody::Variable {
                name: name.to_string(),
                min_length,
                max_length,
            },
        }))
    }

    /// Creates a binary item. Each value is an integer in `[0, 255]`, a
    /// `0b`-prefixed bit literal, or a variable name.
    pub fn binary(values: Vec<Value>) -> Result<Item, ItemError> {
        if values.len() > MAX_BYTE_SIZE {
            return Err(ItemError::SizeLimitExceeded);
        }
        let mut node_values = Vec::with_capacity(values.len());
        let mut variables = Vec::new();
        for (i, value) in values.into_iter().enumerate() {
            match value {
                Value::Int(v) => node_values.push(
                    u8::try_from(v).map_err(|_| ItemError::ValueOverflow("binary"))?,
                ),
                Value::Uint(v) => node_values.push(
                    u8::try_from(v).map_err(|_| ItemError::ValueOverflow("binary"))?,
                ),
                Value::Str(s) if s.starts_with("0b") => {
                    let bits = u16::from_str_radix(&s[2..], 2)
                        .map_err(|_| ItemError::InvalidBinaryLiteral(s.clone()))?;
                    node_values.push(
                        u8::try_from(bits).map_err(|_| ItemError::ValueOverflow("binary"))?,
                    );
                }
                Value::Str(s) => {
                    push_variable(&mut variables, i, s)?;
                    node_values.push(0);
                }
                _ => return Err(ItemError::InvalidValueType("binary")),
            }
        }
        Ok(Item::Binary(BinaryItem {
            values: node_values,
            variables,
        }))
    }

    /// Creates a boolean item from booleans and variable names.
    pub fn boolean(values: Vec<Value>) -> Result<Item, ItemError> {
        if values.len() > MAX_BYTE_SIZE {
            return Err(ItemError::SizeLimitExceeded);
        }
        let mut node_values = Vec::with_capacity(values.len());
        let mut variables = Vec::new();
        for (i, value) in values.into_iter().enumerate() {
            match value {
                Value::Bool(v) => node_values.push(v),
                Value::Str(s) => {
                    push_variable(&mut variables, i, s)?;
                    node_values.push(false);
                }
                _ => return Err(ItemError::InvalidValueType("boolean")),
            }
        }
        Ok(Item::Boolean(BooleanItem {
            values: node_values,
            variables,
        }))
    }

    /// Creates a signed integer item of the given width (1, 2, 4, or 8
    /// bytes) from integers within the width's range and variable names.
    pub fn int(byte_size: u8, values: Vec<Value>) -> Result<Item, ItemError> {
        if !matches!(byte_size, 1 | 2 | 4 | 8) {
            return Err(ItemError::InvalidByteSize(byte_size));
        }
        if values.len() * byte_size as usize > MAX_BYTE_SIZE {
            return Err(ItemError::SizeLimitExceeded);
        }
        let (min, max) = int_bounds(byte_size);
        let mut node_values = Vec::with_capacity(values.len());
        let mut variables = Vec::new();
        for (i, value) in values.into_iter().enumerate() {
            match value {
                Value::Int(v) => {
                    if v < min || v > max {
                        return Err(ItemError::ValueOverflow("int"));
                    }
                    node_values.push(v);
                }
                Value::Uint(v) => {
                    let v = i64::try_from(v).map_err(|_| ItemError::ValueOverflow("int"))?;
                    if v > max {
                        return Err(ItemError::ValueOverflow("int"));
                    }
                    node_values.push(v);
                }
                Value::Str(s) => {
                    push_variable(&mut variables, i, s)?;
                    node_values.push(0);
                }
                _ => return Err(ItemError::InvalidValueType("int")),
            }
        }
        Ok(Item::Int(IntItem {
            byte_size,
            values: node_values,
            variables,
        }))
    }

    /// Creates an unsigned integer item of the given width (1, 2, 4, or 8
    /// bytes) from non-negative integers within range and variable names.
    pub fn uint(byte_size: u8, values: Vec<Value>) -> Result<Item, ItemError> {
        if !matches!(byte_size, 1 | 2 | 4 | 8) {
            return Err(ItemError::InvalidByteSize(byte_size));
        }
        if values.len() * byte_size as usize > MAX_BYTE_SIZE {
            return Err(ItemError::SizeLimitExceeded);
        }
        let max = uint_bound(byte_size);
        let mut node_values = Vec::with_capacity(values.len());
        let mut variables = Vec::new();
        for (i, value) in values.into_iter().enumerate() {
            match value {
                Value::Uint(v) => {
                    if v > max {
                        return Err(ItemError::ValueOverflow("uint"));
                    }
                    node_values.push(v);
                }
                Value::Int(v) => {
                    let v = u64::try_from(v).map_err(|_| ItemError::ValueOverflow("uint"))?;
                    if v > max {
                        return Err(ItemError::ValueOverflow("uint"));
                    }
                    node_values.push(v);
                }
                Value::Str(s) => {
                    push_variable(&mut variables, i, s)?;
                    node_values.push(0);
                }
                _ => return Err(ItemError::InvalidValueType("uint")),
            }
        }
        Ok(Item::Uint(UintItem {
            byte_size,
            values: node_values,
            variables,
        }))
    }

    /// Creates a float item of the given width (4 or 8 bytes) from finite
    /// floats within the width's range, integers, and variable names.
    pub fn float(byte_size: u8, values: Vec<Value>) -> Result<Item, ItemError> {
        if !matches!(byte_size, 4 | 8) {
            return Err(ItemError::InvalidByteSize(byte_size));
        }
        if values.len() * byte_size as usize > MAX_BYTE_SIZE {
            return Err(ItemError::SizeLimitExceeded);
        }
        let max = if byte_size == 4 {
            f32::MAX as f64
        } else {
            f64::MAX
        };
        let mut node_values = Vec::with_capacity(values.len());
        let mut variables = Vec::new();
        for (i, value) in values.into_iter().enumerate() {
            match value {
                Value::Float(v) => {
                    if !v.is_finite() {
                        return Err(ItemError::NonFiniteFloat);
                    }
                    if v.abs() > max {
                        return Err(ItemError::ValueOverflow("float"));
                    }
                    node_values.push(v);
                }
                Value::Int(v) => node_values.push(v as f64),
                Value::Uint(v) => node_values.push(v as f64),
                Value::Str(s) => {
                    push_variable(&mut variables, i, s)?;
                    node_values.push(0.0);
                }
                _ => return Err(ItemError::InvalidValueType("float")),
            }
        }
        Ok(Item::Float(FloatItem {
            byte_size,
            values: node_values,
            variables,
        }))
    }

    /// Number of elements in the item, counting variable placeholders; list
    /// children are counted non-recursively. `None` for an ASCII variable,
    /// whose length is unknown until filled.
    pub fn size(&self) -> Option<usize> {
        match self {
            Item::Empty => Some(0),
            Item::List(node) => Some(node.values.len()),
            Item::Ascii(node) => match &node.body {
                AsciiBody::Literal(s) => Some(s.len()),
                AsciiBody::Variable { .. } => None,
            },
            Item::Binary(node) => Some(node.values.len()),
            Item::Boolean(node) => Some(node.values.len()),
            Item::Int(node) => Some(node.values.len()),
            Item::Uint(node) => Some(node.values.len()),
            Item::Float(node) => Some(node.values.len()),
        }
    }

    /// Variable names in positional order; lists traverse depth first.
    pub fn variables(&self) -> Vec<String> {
        match self {
            Item::Empty => Vec::new(),
            Item::List(node) => node.variables(),
            Item::Ascii(node) => match &node.body {
                AsciiBody::Literal(_) => Vec::new(),
                AsciiBody::Variable { name, .. } => vec![name.clone()],
            },
            Item::Binary(node) => slot_names(&node.variables),
            Item::Boolean(node) => slot_names(&node.variables),
            Item::Int(node) => slot_names(&node.variables),
            Item::Uint(node) => slot_names(&node.variables),
            Item::Float(node) => slot_names(&node.variables),
        }
    }

    /// Returns a new item with the named variables replaced by the supplied
    /// values. Unknown names are ignored; variables not in the map are kept.
    /// In lists, ellipsis expansion happens before ordinary substitution.
    pub fn fill(&self, values: &HashMap<String, Value>) -> Result<Item, ItemError> {
        match self {
            Item::Empty => Ok(Item::Empty),
            Item::List(node) => node.fill(values),
            Item::Ascii(node) => node.fill(values),
            Item::Binary(node) => {
                match substitute(&node.variables, values, node.values.len(), |i| {
                    Value::Uint(node.values[i] as u64)
                }) {
                    Some(vals) => Item::binary(vals),
                    None => Ok(self.clone()),
                }
            }
            Item::Boolean(node) => {
                match substitute(&node.variables, values, node.values.len(), |i| {
                    Value::Bool(node.values[i])
                }) {
                    Some(vals) => Item::boolean(vals),
                    None => Ok(self.clone()),
                }
            }
            Item::Int(node) => {
                match substitute(&node.variables, values, node.values.len(), |i| {
                    Value::Int(node.values[i])
                }) {
                    Some(vals) => Item::int(node.byte_size, vals),
                    None => Ok(self.clone()),
                }
            }
            Item::Uint(node) => {
                match substitute(&node.variables, values, node.values.len(), |i| {
                    Value::Uint(node.values[i])
                }) {
                    Some(vals) => Item::uint(node.byte_size, vals),
                    None => Ok(self.clone()),
                }
            }
            Item::Float(node) => {
                match substitute(&node.variables, values, node.values.len(), |i| {
                    Value::Float(node.values[i])
                }) {
                    Some(vals) => Item::float(node.byte_size, vals),
                    None => Ok(self.clone()),
                }
            }
        }
    }

    /// SECS-II wire bytes of the item, including the format and length
    /// bytes. Empty when any variable remains unfilled, or when the payload
    /// would exceed the length field limit.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Item::Empty => Vec::new(),
            Item::List(node) => {
                if !node.variables.is_empty() {
                    return Vec::new();
                }
                let mut out = match header_bytes(FORMAT_LIST, node.values.len()) {
                    Some(h) => h,
                    None => return Vec::new(),
                };
                for child in &node.values {
                    let bytes = child.to_bytes();
                    if bytes.is_empty() {
                        return Vec::new();
                    }
                    out.extend_from_slice(&bytes);
                }
                out
            }
            Item::Ascii(node) => match &node.body {
                AsciiBody::Literal(s) => match header_bytes(FORMAT_ASCII, s.len()) {
                    Some(mut out) => {
                        out.extend_from_slice(s.as_bytes());
                        out
                    }
                    None => Vec::new(),
                },
                AsciiBody::Variable { .. } => Vec::new(),
            },
            Item::Binary(node) => {
                if !node.variables.is_empty() {
                    return Vec::new();
                }
                match header_bytes(FORMAT_BINARY, node.values.len()) {
                    Some(mut out) => {
                        out.extend_from_slice(&node.values);
                        out
                    }
                    None => Vec::new(),
                }
            }
            Item::Boolean(node) => {
                if !node.variables.is_empty() {
                    return Vec::new();
                }
                match header_bytes(FORMAT_BOOLEAN, node.values.len()) {
                    Some(mut out) => {
                        out.extend(node.values.iter().map(|&v| v as u8));
                        out
                    }
                    None => Vec::new(),
                }
            }
            Item::Int(node) => {
                if !node.variables.is_empty() {
                    return Vec::new();
                }
                let len = node.values.len() * node.byte_size as usize;
                match header_bytes(int_format_code(node.byte_size), len) {
                    Some(mut out) => {
                        for &v in &node.values {
                            push_be(&mut out, v as u64, node.byte_size);
                        }
                        out
                    }
                    None => Vec::new(),
                }
            }
            Item::Uint(node) => {
                if !node.variables.is_empty() {
                    return Vec::new();
                }
                let len = node.values.len() * node.byte_size as usize;
                match header_bytes(uint_format_code(node.byte_size), len) {
                    Some(mut out) => {
                        for &v in &node.values {
                            push_be(&mut out, v, node.byte_size);
                        }
                        out
                    }
                    None => Vec::new(),
                }
            }
            Item::Float(node) => {
                if !node.variables.is_empty() {
                    return Vec::new();
                }
                let len = node.values.len() * node.byte_size as usize;
                match header_bytes(float_format_code(node.byte_size), len) {
                    Some(mut out) => {
                        for &v in &node.values {
                            if node.byte_size == 4 {
                                push_be(&mut out, (v as f32).to_bits() as u64, 4);
                            } else {
                                push_be(&mut out, v.to_bits(), 8);
                            }
                        }
                        out
                    }
                    None => Vec::new(),
                }
            }
        }
    }

    /// Fill-in length bounds of an ASCII variable item; `None` for every
    /// other item, including ASCII literals.
    pub fn ascii_fill_bounds(&self) -> Option<(usize, Option<usize>)> {
        match self {
            Item::Ascii(AsciiItem {
                body:
                    AsciiBody::Variable {
                        min_length,
                        max_length,
                        ..
                    },
            }) => Some((*min_length, *max_length)),
            _ => None,
        }
    }
}

impl ListItem {
    fn variables(&self) -> Vec<String> {
        let mut result = Vec::new();
        for (i, item) in self.values.iter().enumerate() {
            if let Some(name) = self.variable_at(i) {
                result.push(name.to_string());
            } else {
                result.extend(item.variables());
            }
        }
        result
    }

    fn variable_at(&self, pos: usize) -> Option<&str> {
        self.variables
            .iter()
            .find(|(p, _)| *p == pos)
            .map(|(_, name)| name.as_str())
    }

    fn fill(&self, values: &HashMap<String, Value>) -> Result<Item, ItemError> {
        let mut ellipsis_values = HashMap::new();
        let mut other_values = HashMap::new();
        for (name, value) in values {
            if is_ellipsis(name) {
                ellipsis_values.insert(name.clone(), value.clone());
            } else {
                other_values.insert(name.clone(), value.clone());
            }
        }

        let (to_fill, remaining) = self.ellipsis_analysis(&ellipsis_values)?;
        let expanded;
        let node = if to_fill > 0 {
            let mut state = ExpandState::new(remaining);
            expanded = self.fill_ellipsis(&ellipsis_values, &mut state)?;
            &expanded
        } else {
            self
        };

        let mut node_values = Vec::with_capacity(node.values.len());
        for item in &node.values {
            node_values.push(Value::Item(item.fill(&other_values)?));
        }
        for (pos, name) in &node.variables {
            node_values[*pos] = match other_values.get(name) {
                Some(v) => v.clone(),
                None => Value::Str(name.clone()),
            };
        }
        Item::list(node_values)
    }

    /// Counts the ellipsis that the fill map will expand and the ellipsis
    /// that will remain afterwards; repeats multiply nested counts.
    fn ellipsis_analysis(
        &self,
        values: &HashMap<String, Value>,
    ) -> Result<(usize, usize), ItemError> {
        let mut to_fill = 0;
        let mut remaining = 0;
        let mut repeat = 0;
        for (_, name) in &self.variables {
            if is_ellipsis(name) {
                if let Some(v) = values.get(name) {
                    to_fill = 1;
                    repeat = ellipsis_count(v)?;
                } else {
                    remaining = 1;
                }
            }
        }
        for item in &self.values {
            if let Item::List(child) = item {
                let (f, r) = child.ellipsis_analysis(values)?;
                to_fill += (repeat + 1) * f;
                remaining += (repeat + 1) * r;
            }
        }
        Ok((to_fill, remaining))
    }

    /// Expands ellipsis variables, cloning the slots before each one and
    /// suffixing the clones' variable names with the repeat indices.
    /// Ellipsis are expanded in depth-first appearance order.
    fn fill_ellipsis(
        &self,
        values: &HashMap<String, Value>,
        state: &mut ExpandState,
    ) -> Result<ListItem, ItemError> {
        let mut ellipsis_position = None;
        let mut repeat = 0;
        for (pos, name) in &self.variables {
            if is_ellipsis(name) && values.contains_key(name) {
                ellipsis_position = Some(*pos);
                repeat = ellipsis_count(&values[name])?;
                if repeat > 0 {
                    state.enter_repeat();
                }
                break;
            }
        }

        let mut node_values = Vec::new();
        let mut i = 0;
        while i < self.values.len() {
            if Some(i) == ellipsis_position {
                if repeat == 0 {
                    i += 1;
                    continue;
                }
                if state.repeat_index() < repeat {
                    state.advance();
                    i = 0;
                } else {
                    state.leave_repeat();
                    i += 1;
                    continue;
                }
            }

            let item = &self.values[i];
            if let Some(name) = self.variable_at(i) {
                node_values.push(Value::Str(state.renamed(name)));
            } else {
                match item {
                    Item::List(child) => {
                        node_values
                            .push(Value::Item(Item::List(child.fill_ellipsis(values, state)?)));
                    }
                    Item::Ascii(AsciiItem {
                        body:
                            AsciiBody::Variable {
                                name,
                                min_length,
                                max_length,
                            },
                    }) => {
                        let renamed = state.renamed(name);
                        node_values.push(Value::Item(Item::ascii_variable(
                            &renamed,
                            *min_length,
                            *max_length,
                        )?));
                    }
                    _ => {
                        let inner = item.variables();
                        if inner.is_empty() {
                            node_values.push(Value::Item(item.clone()));
                        } else {
                            let mut renames = HashMap::new();
                            for name in inner {
                                let renamed = state.renamed(&name);
                                renames.insert(name, Value::Str(renamed));
                            }
                            node_values.push(Value::Item(item.fill(&renames)?));
                        }
                    }
                }
            }
            i += 1;
        }
        list_from_values(node_values)
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, level: usize) -> fmt::Result {
        let indent = "  ".repeat(level);
        if self.values.is_empty() {
            return write!(f, "{}<L[0]>", indent);
        }

        // Size is printed only when deterministic, i.e. no direct
        // placeholder or ellipsis slot.
        if self.variables.is_empty() {
            writeln!(f, "{}<L[{}]", indent, self.values.len())?;
        } else {
            writeln!(f, "{}<L", indent)?;
        }
        for (i, item) in self.values.iter().enumerate() {
            if let Item::List(child) = item {
                child.fmt_indented(f, level + 1)?;
                writeln!(f)?;
            } else if let Some(name) = self.variable_at(i) {
                let shown = if is_ellipsis(name) { "..." } else { name };
                writeln!(f, "{}  {}", indent, shown)?;
            } else {
                writeln!(f, "{}  {}", indent, item)?;
            }
        }
        write!(f, "{}>", indent)
    }
}

impl AsciiItem {
    fn fill(&self, values: &HashMap<String, Value>) -> Result<Item, ItemError> {
        let (name, min_length, max_length) = match &self.body {
            AsciiBody::Literal(_) => {
                return Ok(Item::Ascii(self.clone()));
            }
            AsciiBody::Variable {
                name,
                min_length,
                max_length,
            } => (name, *min_length, *max_length),
        };
        let value = match values.get(name) {
            Some(v) => v,
            None => return Ok(Item::Ascii(self.clone())),
        };
        let s = match value {
            Value::Str(s) => s,
            _ => return Err(ItemError::InvalidValueType("ascii")),
        };
        if s.len() < min_length {
            return Err(ItemError::FillLengthOverflow);
        }
        if let Some(max) = max_length {
            if s.len() > max {
                return Err(ItemError::FillLengthOverflow);
            }
        }
        Item::ascii(s)
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Empty => Ok(()),
            Item::List(node) => node.fmt_indented(f, 0),
            Item::Ascii(node) => match &node.body {
                AsciiBody::Literal(s) => write_ascii_literal(f, s),
                AsciiBody::Variable {
                    name,
                    min_length,
                    max_length,
                } => {
                    let bounds = match (*min_length, *max_length) {
                        (0, None) => String::new(),
                        (min, Some(max)) if min == max => format!("[{}]", max),
                        (min, None) => format!("[{}..]", min),
                        (0, Some(max)) => format!("[..{}]", max),
                        (min, Some(max)) => format!("[{}..{}]", min, max),
                    };
                    write!(f, "<A{} {}>", bounds, name)
                }
            },
            Item::Binary(node) => {
                let body = scalar_body(&node.variables, &node.values, |v| format!("0b{:b}", v));
                write_leaf(f, "B", body)
            }
            Item::Boolean(node) => {
                let body = scalar_body(&node.variables, &node.values, |v| {
                    if *v { "T".to_string() } else { "F".to_string() }
                });
                write_leaf(f, "BOOLEAN", body)
            }
            Item::Int(node) => {
                let body = scalar_body(&node.variables, &node.values, |v| v.to_string());
                write_leaf(f, &format!("I{}", node.byte_size), body)
            }
            Item::Uint(node) => {
                let body = scalar_body(&node.variables, &node.values, |v| v.to_string());
                write_leaf(f, &format!("U{}", node.byte_size), body)
            }
            Item::Float(node) => {
                let byte_size = node.byte_size;
                let body = scalar_body(&node.variables, &node.values, |v| {
                    if byte_size == 4 {
                        format!("{}", *v as f32)
                    } else {
                        format!("{}", v)
                    }
                });
                write_leaf(f, &format!("F{}", node.byte_size), body)
            }
        }
    }
}

// Format codes (octal) from the SEMI standard.
const FORMAT_LIST: u8 = 0o00;
const FORMAT_BINARY: u8 = 0o10;
const FORMAT_BOOLEAN: u8 = 0o11;
const FORMAT_ASCII: u8 = 0o20;

fn int_format_code(byte_size: u8) -> u8 {
    match byte_size {
        1 => 0o31,
        2 => 0o32,
        4 => 0o34,
        _ => 0o30,
    }
}

fn uint_format_code(byte_size: u8) -> u8 {
    match byte_size {
        1 => 0o51,
        2 => 0o52,
        4 => 0o54,
        _ => 0o50,
    }
}

fn float_format_code(byte_size: u8) -> u8 {
    if byte_size == 4 {
        0o44
    } else {
        0o40
    }
}

/// Format byte and minimal big-endian length bytes for a data payload of
/// `data_len` bytes. `None` when the payload exceeds the length field limit.
fn header_bytes(format_code: u8, data_len: usize) -> Option<Vec<u8>> {
    if data_len > MAX_BYTE_SIZE {
        return None;
    }
    let raw = [(data_len >> 16) as u8, (data_len >> 8) as u8, data_len as u8];
    let length_bytes: &[u8] = if raw[0] != 0 {
        &raw
    } else if raw[1] != 0 {
        &raw[1..]
    } else {
        &raw[2..]
    };
    let mut out = Vec::with_capacity(1 + length_bytes.len());
    out.push((format_code << 2) | length_bytes.len() as u8);
    out.extend_from_slice(length_bytes);
    Some(out)
}

fn push_be(out: &mut Vec<u8>, bits: u64, byte_size: u8) {
    for i in (0..byte_size).rev() {
        out.push((bits >> (i * 8)) as u8);
    }
}

fn int_bounds(byte_size: u8) -> (i64, i64) {
    match byte_size {
        1 => (i8::MIN as i64, i8::MAX as i64),
        2 => (i16::MIN as i64, i16::MAX as i64),
        4 => (i32::MIN as i64, i32::MAX as i64),
        _ => (i64::MIN, i64::MAX),
    }
}

fn uint_bound(byte_size: u8) -> u64 {
    match byte_size {
        1 => u8::MAX as u64,
        2 => u16::MAX as u64,
        4 => u32::MAX as u64,
        _ => u64::MAX,
    }
}

/// Variable names must start with a letter or underscore, continue with
/// alphanumerics or underscores, and may end with `[digits]` tags.
pub(crate) fn is_valid_var_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    if bytes.is_empty() || !(bytes[0].is_ascii_alphabetic() || bytes[0] == b'_') {
        return false;
    }
    let mut i = 1;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
    }
    while i < bytes.len() {
        if bytes[i] != b'[' {
            return false;
        }
        i += 1;
        let digits = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == digits || i >= bytes.len() || bytes[i] != b']' {
            return false;
        }
        i += 1;
    }
    true
}

/// `...` optionally followed by a single `[digits]` tag.
pub(crate) fn is_ellipsis(name: &str) -> bool {
    let rest = match name.strip_prefix("...") {
        Some(rest) => rest,
        None => return false,
    };
    if rest.is_empty() {
        return true;
    }
    match rest.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        Some(digits) => !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

fn push_variable(
    variables: &mut Vec<(usize, String)>,
    pos: usize,
    name: String,
) -> Result<(), ItemError> {
    if !is_valid_var_name(&name) {
        return Err(ItemError::InvalidVariableName(name));
    }
    if variables.iter().any(|(_, n)| *n == name) {
        return Err(ItemError::DuplicateVariable(name));
    }
    variables.push((pos, name));
    Ok(())
}

fn slot_names(variables: &[(usize, String)]) -> Vec<String> {
    variables.iter().map(|(_, name)| name.clone()).collect()
}

/// Rebuilds a scalar node's input values with fill-ins applied. `None` when
/// nothing changed, so callers can keep the original node.
fn substitute(
    variables: &[(usize, String)],
    fill: &HashMap<String, Value>,
    len: usize,
    value_at: impl Fn(usize) -> Value,
) -> Option<Vec<Value>> {
    if variables.is_empty() {
        return None;
    }
    let mut out: Vec<Value> = (0..len).map(value_at).collect();
    let mut changed = false;
    for (pos, name) in variables {
        match fill.get(name) {
            Some(v) => {
                out[*pos] = v.clone();
                changed = true;
            }
            None => out[*pos] = Value::Str(name.clone()),
        }
    }
    if changed {
        Some(out)
    } else {
        None
    }
}

fn ellipsis_count(value: &Value) -> Result<usize, ItemError> {
    match value {
        Value::Int(v) if *v >= 0 => Ok(*v as usize),
        Value::Uint(v) => usize::try_from(*v).map_err(|_| ItemError::InvalidEllipsisCount),
        _ => Err(ItemError::InvalidEllipsisCount),
    }
}

fn list_from_values(values: Vec<Value>) -> Result<ListItem, ItemError> {
    if values.len() > MAX_BYTE_SIZE {
        return Err(ItemError::SizeLimitExceeded);
    }
    let mut node_values = Vec::with_capacity(values.len());
    let mut variables: Vec<(usize, String)> = Vec::new();
    for (i, value) in values.into_iter().enumerate() {
        match value {
            Value::Item(item) => node_values.push(item),
            Value::Str(name) => {
                if variables.iter().any(|(_, n)| *n == name) {
                    return Err(ItemError::DuplicateVariable(name));
                }
                variables.push((i, name));
                node_values.push(Item::Empty);
            }
            _ => return Err(ItemError::InvalidValueType("list")),
        }
    }

    let mut ellipsis_seen = false;
    for (pos, name) in &variables {
        if is_valid_var_name(name) {
            continue;
        }
        if is_ellipsis(name) {
            if *pos == 0 {
                return Err(ItemError::EllipsisFirst);
            }
            if ellipsis_seen {
                return Err(ItemError::MultipleEllipsis);
            }
            ellipsis_seen = true;
        } else {
            return Err(ItemError::InvalidVariableName(name.clone()));
        }
    }

    let node = ListItem {
        values: node_values,
        variables,
    };

    // Variable names must be unique across the whole subtree.
    let mut seen = HashSet::new();
    for name in node.variables() {
        if !seen.insert(name.clone()) {
            return Err(ItemError::DuplicateVariable(name));
        }
    }
    Ok(node)
}

fn scalar_body<T>(
    variables: &[(usize, String)],
    values: &[T],
    format: impl Fn(&T) -> String,
) -> Vec<String> {
    let mut out: Vec<String> = values.iter().map(format).collect();
    for (pos, name) in variables {
        out[*pos] = name.clone();
    }
    out
}

fn write_leaf(f: &mut fmt::Formatter<'_>, type_name: &str, body: Vec<String>) -> fmt::Result {
    if body.is_empty() {
        return write!(f, "<{}[0]>", type_name);
    }
    write!(f, "<{}[{}] {}>", type_name, body.len(), body.join(" "))
}

/// Prints printable runs inside double quotes and other bytes as ` 0xNN`,
/// alternating as the value is traversed.
fn write_ascii_literal(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    if s.is_empty() {
        return write!(f, "<A[0]>");
    }
    write!(f, "<A")?;
    let mut printable = false;
    for &b in s.as_bytes() {
        if b < 0x20 || b == 0x7F {
            if printable {
                printable = false;
                write!(f, "\"")?;
            }
            write!(f, " 0x{:02X}", b)?;
        } else {
            if !printable {
                printable = true;
                write!(f, " \"")?;
            }
            write!(f, "{}", b as char)?;
        }
    }
    if printable {
        write!(f, "\"")?;
    }
    write!(f, ">")
}

/// Per-expansion traversal state: the index stack that builds array-like
/// name suffixes and the counter that renumbers remaining ellipsis.
struct ExpandState {
    depth: usize,
    indices: Vec<usize>,
    ellipsis_seen: usize,
    multiple_ellipsis: bool,
}

impl ExpandState {
    fn new(remaining_ellipsis: usize) -> ExpandState {
        ExpandState {
            depth: 0,
            indices: Vec::new(),
            ellipsis_seen: 0,
            multiple_ellipsis: remaining_ellipsis > 1,
        }
    }

    fn enter_repeat(&mut self) {
        if self.depth == self.indices.len() {
            self.indices.push(0);
        } else {
            self.indices[self.depth] = 0;
        }
        self.depth += 1;
    }

    fn leave_repeat(&mut self) {
        self.depth -= 1;
    }

    fn repeat_index(&self) -> usize {
        self.indices[self.depth - 1]
    }

    fn advance(&mut self) {
        self.indices[self.depth - 1] += 1;
    }

    fn renamed(&mut self, name: &str) -> String {
        if is_ellipsis(name) {
            if self.multiple_ellipsis {
                let renamed = format!("...[{}]", self.ellipsis_seen);
                self.ellipsis_seen += 1;
                return renamed;
            }
            return "...".to_string();
        }
        let mut out = name.to_string();
        for i in 0..self.depth {
            out.push_str(&format!("[{}]", self.indices[i]));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill_map(entries: &[(&str, Value)]) -> HashMap<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn ascii_literal_printing_alternates_runs_and_escapes() {
        let cases = [
            ("", "<A[0]>"),
            ("A", "<A \"A\">"),
            ("lorem ipsum", "<A \"lorem ipsum\">"),
            ("\n", "<A 0x0A>"),
            ("\r\ntext", "<A 0x0D 0x0A \"text\">"),
            ("text\n\x00", "<A \"text\" 0x0A 0x00>"),
            ("te\t\x7Fxt", "<A \"te\" 0x09 0x7F \"xt\">"),
        ];
        for (input, expected) in cases {
            assert_eq!(Item::ascii(input).unwrap().to_string(), expected);
        }
    }

    #[test]
    fn ascii_variable_printing_shows_length_bounds() {
        let cases = [
            (0, None, "<A var>"),
            (3, Some(3), "<A[3] var>"),
            (2, None, "<A[2..] var>"),
            (0, Some(7), "<A[..7] var>"),
            (2, Some(7), "<A[2..7] var>"),
            (0, Some(0), "<A[0] var>"),
        ];
        for (min, max, expected) in cases {
            let item = Item::ascii_variable("var", min, max).unwrap();
            assert_eq!(item.to_string(), expected);
            assert_eq!(item.size(), None);
            assert_eq!(item.ascii_fill_bounds(), Some((min, max)));
        }
    }

    #[test]
    fn ascii_rejects_non_ascii_and_bad_bounds() {
        assert!(Item::ascii("café").is_err());
        assert!(Item::ascii_variable("var", 5, Some(2)).is_err());
        assert!(Item::ascii_variable("...", 0, None).is_err());
    }

    #[test]
    fn ascii_fill_checks_length_bounds() {
        let item = Item::ascii_variable("var", 2, Some(4)).unwrap();
        let filled = item.fill(&fill_map(&[("var", Value::from("abc"))])).unwrap();
        assert_eq!(filled, Item::ascii("abc").unwrap());
        assert!(item.fill(&fill_map(&[("var", Value::from("a"))])).is_err());
        assert!(item
            .fill(&fill_map(&[("var", Value::from("abcde"))]))
            .is_err());
        // Unknown names leave the variable in place.
        let kept = item.fill(&fill_map(&[("other", Value::from("abc"))])).unwrap();
        assert_eq!(kept.variables(), vec!["var".to_string()]);
    }

    #[test]
    fn numeric_factories_enforce_width_ranges() {
        assert!(Item::int(1, vec![Value::Int(127)]).is_ok());
        assert!(Item::int(1, vec![Value::Int(128)]).is_err());
        assert!(Item::int(2, vec![Value::Int(-32769)]).is_err());
        assert!(Item::int(8, vec![Value::Uint(u64::MAX)]).is_err());
        assert!(Item::uint(1, vec![Value::Uint(255)]).is_ok());
        assert!(Item::uint(1, vec![Value::Uint(256)]).is_err());
        assert!(Item::uint(4, vec![Value::Int(-1)]).is_err());
        assert!(Item::binary(vec![Value::Int(256)]).is_err());
        assert!(Item::int(3, vec![]).is_err());
        assert!(Item::float(2, vec![]).is_err());
    }

    #[test]
    fn float_factories_reject_non_finite_values() {
        assert!(Item::float(4, vec![Value::Float(f64::NAN)]).is_err());
        assert!(Item::float(8, vec![Value::Float(f64::INFINITY)]).is_err());
        assert!(Item::float(4, vec![Value::Float(1e39)]).is_err());
        assert!(Item::float(8, vec![Value::Float(1e39)]).is_ok());
    }

    #[test]
    fn binary_accepts_bit_literals() {
        let item = Item::binary(vec![
            Value::from("0b0"),
            Value::from("0b11111110"),
            Value::Int(255),
            Value::from("var"),
        ])
        .unwrap();
        assert_eq!(item.to_string(), "<B[4] 0b0 0b11111110 0b11111111 var>");
        assert!(Item::binary(vec![Value::from("0b100000000")]).is_err());
        assert!(Item::binary(vec![Value::from("0bxyz")]).is_err());
    }

    #[test]
    fn leaf_encodings_match_the_wire_format() {
        assert_eq!(
            Item::ascii("text").unwrap().to_bytes(),
            vec![0x41, 4, 0x74, 0x65, 0x78, 0x74]
        );
        assert_eq!(Item::ascii("").unwrap().to_bytes(), vec![0x41, 0]);
        assert_eq!(
            Item::boolean(vec![Value::Bool(true), Value::Bool(false)])
                .unwrap()
                .to_bytes(),
            vec![0x25, 2, 1, 0]
        );
        assert_eq!(
            Item::int(2, vec![Value::Int(-1), Value::Int(258)])
                .unwrap()
                .to_bytes(),
            vec![0x69, 4, 0xFF, 0xFF, 0x01, 0x02]
        );
        assert_eq!(
            Item::uint(4, vec![Value::Uint(0x01020304)])
                .unwrap()
                .to_bytes(),
            vec![0xB1, 4, 1, 2, 3, 4]
        );
        assert_eq!(
            Item::float(4, vec![Value::Float(1.0)]).unwrap().to_bytes(),
            vec![0x91, 4, 0x3F, 0x80, 0, 0]
        );
        assert_eq!(
            Item::float(8, vec![Value::Float(1.0)]).unwrap().to_bytes(),
            vec![0x81, 8, 0x3F, 0xF0, 0, 0, 0, 0, 0, 0]
        );
        // An unfilled variable makes the whole encoding empty.
        assert!(Item::uint(1, vec![Value::from("var")])
            .unwrap()
            .to_bytes()
            .is_empty());
    }

    #[test]
    fn length_field_uses_the_minimal_byte_count() {
        let small = Item::binary(vec![Value::Int(0); 255]).unwrap().to_bytes();
        assert_eq!(&small[..2], &[(0o10 << 2) | 1, 255]);
        let medium = Item::binary(vec![Value::Int(0); 256]).unwrap().to_bytes();
        assert_eq!(&medium[..3], &[(0o10 << 2) | 2, 1, 0]);
        let large = Item::binary(vec![Value::Int(0); 65536]).unwrap().to_bytes();
        assert_eq!(&large[..4], &[(0o10 << 2) | 3, 1, 0, 0]);
    }

    #[test]
    fn nested_list_encoding_and_printing() {
        let item = Item::list(vec![
            Value::Item(Item::list(vec![]).unwrap()),
            Value::Item(
                Item::list(vec![Value::Item(
                    Item::int(1, vec![Value::Int(33), Value::Int(55)]).unwrap(),
                )])
                .unwrap(),
            ),
        ])
        .unwrap();
        assert_eq!(
            item.to_bytes(),
            vec![0x01, 2, 0x01, 0, 0x01, 1, 0x65, 2, 33, 55]
        );
        assert_eq!(
            item.to_string(),
            "<L[2]\n  <L[0]>\n  <L[1]\n    <I1[2] 33 55>\n  >\n>"
        );
    }

    #[test]
    fn list_variables_are_depth_first_and_globally_unique() {
        let item = Item::list(vec![
            Value::Item(Item::ascii_variable("varC", 0, None).unwrap()),
            Value::Item(Item::int(1, vec![Value::from("varB"), Value::from("varA")]).unwrap()),
            Value::Item(Item::binary(vec![]).unwrap()),
        ])
        .unwrap();
        assert_eq!(item.variables(), vec!["varC", "varB", "varA"]);
        assert!(item.to_bytes().is_empty());
        assert_eq!(
            item.to_string(),
            "<L[3]\n  <A varC>\n  <I1[2] varB varA>\n  <B[0]>\n>"
        );

        let dup = Item::list(vec![
            Value::Item(Item::ascii_variable("foo", 0, None).unwrap()),
            Value::Item(Item::uint(1, vec![Value::from("foo")]).unwrap()),
        ]);
        assert!(matches!(dup, Err(ItemError::DuplicateVariable(_))));
    }

    #[test]
    fn list_fill_substitutes_values_and_keeps_missing_variables() {
        let item = Item::list(vec![
            Value::Item(Item::ascii_variable("varC", 0, None).unwrap()),
            Value::Item(Item::int(1, vec![Value::from("varB"), Value::from("varA")]).unwrap()),
            Value::Item(Item::binary(vec![]).unwrap()),
        ])
        .unwrap();

        let filled = item
            .fill(&fill_map(&[
                ("varC", Value::from("text")),
                ("varB", Value::Int(0)),
                ("varA", Value::Int(1)),
                ("unused", Value::from("bar")),
            ]))
            .unwrap();
        assert!(filled.variables().is_empty());
        assert_eq!(
            filled.to_bytes(),
            vec![0x01, 3, 0x41, 4, 0x74, 0x65, 0x78, 0x74, 0x65, 2, 0, 1, 0x21, 0]
        );

        let partial = item
            .fill(&fill_map(&[
                ("varC", Value::from("text")),
                ("varB", Value::Int(0)),
            ]))
            .unwrap();
        assert_eq!(partial.variables(), vec!["varA"]);
        assert!(partial.to_bytes().is_empty());
        assert_eq!(
            partial.to_string(),
            "<L[3]\n  <A \"text\">\n  <I1[2] 0 varA>\n  <B[0]>\n>"
        );
    }

    #[test]
    fn list_rules_for_ellipsis_placement() {
        assert!(matches!(
            Item::list(vec![Value::from("...")]),
            Err(ItemError::EllipsisFirst)
        ));
        assert!(matches!(
            Item::list(vec![
                Value::Item(Item::binary(vec![]).unwrap()),
                Value::from("..."),
                Value::from("...[1]"),
            ]),
            Err(ItemError::MultipleEllipsis)
        ));
        assert!(matches!(
            Item::uint(1, vec![Value::from("...")]),
            Err(ItemError::InvalidVariableName(_))
        ));
        assert!(matches!(
            Item::list(vec![Value::from("9bad")]),
            Err(ItemError::InvalidVariableName(_))
        ));
    }

    #[test]
    fn ellipsis_fill_with_zero_removes_the_slot() {
        let item = Item::list(vec![
            Value::Item(Item::ascii_variable("var", 0, None).unwrap()),
            Value::from("varNode"),
            Value::from("..."),
        ])
        .unwrap();
        let filled = item.fill(&fill_map(&[("...", Value::Int(0))])).unwrap();
        assert_eq!(filled.size(), Some(2));
        assert_eq!(filled.variables(), vec!["var", "varNode"]);
        assert_eq!(filled.to_string(), "<L\n  <A var>\n  varNode\n>");
    }

    #[test]
    fn ellipsis_fill_clones_and_suffixes_preceding_slots() {
        let item = Item::list(vec![
            Value::Item(Item::ascii_variable("var", 0, None).unwrap()),
            Value::from("varNode"),
            Value::from("..."),
        ])
        .unwrap();

        let once = item.fill(&fill_map(&[("...", Value::Int(1))])).unwrap();
        assert_eq!(once.size(), Some(4));
        assert_eq!(
            once.variables(),
            vec!["var[0]", "varNode[0]", "var[1]", "varNode[1]"]
        );

        let twice = item
            .fill(&fill_map(&[
                ("...", Value::Int(2)),
                ("var[2]", Value::from("text")),
                (
                    "varNode[2]",
                    Value::Item(Item::int(1, vec![Value::Int(0), Value::Int(1)]).unwrap()),
                ),
            ]))
            .unwrap();
        assert_eq!(twice.size(), Some(6));
        assert_eq!(
            twice.variables(),
            vec!["var[0]", "varNode[0]", "var[1]", "varNode[1]"]
        );
        assert_eq!(
            twice.to_string(),
            "<L\n  <A var[0]>\n  varNode[0]\n  <A var[1]>\n  varNode[1]\n  <A \"text\">\n  <I1[2] 0 1>\n>"
        );
    }

    #[test]
    fn slots_after_the_ellipsis_are_not_duplicated() {
        let item = Item::list(vec![
            Value::Item(
                Item::list(vec![
                    Value::Item(Item::int(1, vec![Value::from("foo")]).unwrap()),
                    Value::from("...[0]"),
                    Value::Item(Item::ascii("").unwrap()),
                    Value::Item(Item::binary(vec![]).unwrap()),
                ])
                .unwrap(),
            ),
            Value::Item(
                Item::list(vec![
                    Value::from("varNode1"),
                    Value::from("...[1]"),
                    Value::from("varNode2"),
                ])
                .unwrap(),
            ),
        ])
        .unwrap();
        let filled = item
            .fill(&fill_map(&[
                ("...[0]", Value::Int(2)),
                ("...[1]", Value::Int(1)),
            ]))
            .unwrap();
        assert_eq!(
            filled.variables(),
            vec![
                "foo[0]",
                "foo[1]",
                "foo[2]",
                "varNode1[0]",
                "varNode1[1]",
                "varNode2"
            ]
        );
    }

    #[test]
    fn remaining_ellipsis_are_renumbered_in_emission_order() {
        let item = Item::list(vec![
            Value::Item(
                Item::list(vec![
                    Value::Item(Item::int(1, vec![Value::Int(0)]).unwrap()),
                    Value::from("...[0]"),
                ])
                .unwrap(),
            ),
            Value::from("...[1]"),
        ])
        .unwrap();

        let outer_only = item.fill(&fill_map(&[("...[1]", Value::Int(2))])).unwrap();
        assert_eq!(outer_only.size(), Some(3));
        assert_eq!(outer_only.variables(), vec!["...[0]", "...[1]", "...[2]"]);

        let inner_only = item.fill(&fill_map(&[("...[0]", Value::Int(4))])).unwrap();
        assert_eq!(inner_only.size(), Some(2));
        assert_eq!(inner_only.variables(), vec!["..."]);
        assert_eq!(
            inner_only.to_string(),
            "<L\n  <L[5]\n    <I1[1] 0>\n    <I1[1] 0>\n    <I1[1] 0>\n    <I1[1] 0>\n    <I1[1] 0>\n  >\n  ...\n>"
        );
    }

    #[test]
    fn nested_ellipsis_expansions_compose_multiplicatively() {
        let item = Item::list(vec![
            Value::Item(
                Item::list(vec![
                    Value::Item(Item::int(1, vec![Value::from("foo")]).unwrap()),
                    Value::Item(
                        Item::list(vec![
                            Value::Item(Item::int(1, vec![Value::from("bar")]).unwrap()),
                            Value::from("varNode"),
                            Value::from("...[0]"),
                        ])
                        .unwrap(),
                    ),
                    Value::from("...[1]"),
                ])
                .unwrap(),
            ),
            Value::from("...[2]"),
            Value::Item(Item::int(1, vec![Value::from("var")]).unwrap()),
        ])
        .unwrap();

        let filled = item
            .fill(&fill_map(&[
                ("...[0]", Value::Int(2)),
                ("...[1]", Value::Int(1)),
                ("...[2]", Value::Int(0)),
                ("foo[0]", Value::Int(0)),
                ("bar[0][0]", Value::Int(1)),
                ("bar[0][1]", Value::Int(2)),
                ("bar[0][2]", Value::Int(3)),
                ("foo[1]", Value::Int(4)),
                ("bar[1][0]", Value::Int(5)),
                ("bar[1][1]", Value::Int(6)),
                ("bar[1][2]", Value::Int(7)),
                ("varNode[0][0]", Value::Item(Item::list(vec![]).unwrap())),
                ("varNode[0][1]", Value::Item(Item::boolean(vec![]).unwrap())),
                (
                    "varNode[0][2]",
                    Value::Item(Item::boolean(vec![Value::Bool(true)]).unwrap()),
                ),
                (
                    "varNode[1][0]",
                    Value::Item(
                        Item::list(vec![Value::Item(
                            Item::boolean(vec![Value::Bool(false)]).unwrap(),
                        )])
                        .unwrap(),
                    ),
                ),
                (
                    "varNode[1][1]",
                    Value::Item(Item::boolean(vec![Value::Bool(true)]).unwrap()),
                ),
                (
                    "varNode[1][2]",
                    Value::Item(
                        Item::boolean(vec![Value::Bool(true), Value::Bool(false)]).unwrap(),
                    ),
                ),
                ("var", Value::Int(8)),
            ]))
            .unwrap();

        assert_eq!(filled.size(), Some(2));
        assert!(filled.variables().is_empty());
        assert_eq!(
            filled.to_bytes(),
            vec![
                0x01, 2, //
                0x01, 4, //
                0x65, 1, 0, //
                0x01, 6, //
                0x65, 1, 1, //
                0x01, 0, //
                0x65, 1, 2, //
                0x25, 0, //
                0x65, 1, 3, //
                0x25, 1, 1, //
                0x65, 1, 4, //
                0x01, 6, //
                0x65, 1, 5, //
                0x01, 1, 0x25, 1, 0, //
                0x65, 1, 6, //
                0x25, 1, 1, //
                0x65, 1, 7, //
                0x25, 2, 1, 0, //
                0x65, 1, 8,
            ]
        );
    }

    #[test]
    fn fill_closure_removes_exactly_the_filled_names() {
        let item = Item::uint(2, vec![Value::from("a"), Value::Uint(1), Value::from("b")]).unwrap();
        assert_eq!(item.variables(), vec!["a", "b"]);
        let filled = item.fill(&fill_map(&[("a", Value::Uint(7))])).unwrap();
        assert_eq!(filled.variables(), vec!["b"]);
        // Filling with a string renames the variable.
        let renamed = item.fill(&fill_map(&[("b", Value::from("c"))])).unwrap();
        assert_eq!(renamed.variables(), vec!["a", "c"]);
    }

    #[test]
    fn size_limit_is_enforced_at_construction() {
        assert!(Item::ascii(&"a".repeat(MAX_BYTE_SIZE + 1)).is_err());
        assert!(Item::ascii(&"a".repeat(MAX_BYTE_SIZE)).is_ok());
    }
}
