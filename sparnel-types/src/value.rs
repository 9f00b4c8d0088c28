use core::cell::RefCell;
use core::cmp::Ordering;
use core::fmt;
use std::rc::Rc;

use sparnel_asm::{Tag, TypeFlags, TypeWord};

use crate::{Array, Function, Map, Str, Userinfo};

/// Complete runtime type of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[allow(missing_docs)]
pub enum Type {
    Nil,
    Bool,
    Int,
    Float,
    Str,
    Array,
    Map,
    Function,
    WeakUserinfo,
    StrongUserinfo,
}

impl Type {
    /// The name scripts observe through `typeof`.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "string",
            Self::Array => "array",
            Self::Map => "hashmap",
            Self::Function => "function",
            Self::WeakUserinfo | Self::StrongUserinfo => "userinfo",
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors raised by value-level operations, converted to VM faults at the
/// instruction boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    /// The operands do not share an ordering.
    #[error("values of type {lhs} and {rhs} are not comparable")]
    NotComparable {
        /// Left operand type.
        lhs: Type,
        /// Right operand type.
        rhs: Type,
    },
    /// The value cannot be used as a hash key.
    #[error("value of type {0} is not hashable")]
    Unhashable(Type),
}

/// A runtime value.
///
/// Heap variants hold `Rc` referents; cloning retains, dropping releases.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// The absent value.
    #[default]
    Nil,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// IEEE double.
    Float(f64),
    /// Immutable string.
    Str(Rc<Str>),
    /// Aggregate: dense integer head plus hashed spill.
    Array(Rc<RefCell<Array>>),
    /// Standalone hashmap.
    Map(Rc<RefCell<Map>>),
    /// Script or native function.
    Function(Rc<Function>),
    /// Opaque host handle.
    Userinfo(Userinfo),
}

impl Value {
    /// Allocate an empty aggregate.
    pub fn new_array() -> Self {
        Self::Array(Rc::new(RefCell::new(Array::new())))
    }

    /// Allocate an empty hashmap.
    pub fn new_map() -> Self {
        Self::Map(Rc::new(RefCell::new(Map::new())))
    }

    /// Wrap a string.
    pub fn string(text: impl Into<String>) -> Self {
        Self::Str(Rc::new(Str::new(text)))
    }

    /// The value's runtime type.
    pub fn type_of(&self) -> Type {
        match self {
            Self::Nil => Type::Nil,
            Self::Bool(_) => Type::Bool,
            Self::Int(_) => Type::Int,
            Self::Float(_) => Type::Float,
            Self::Str(_) => Type::Str,
            Self::Array(_) => Type::Array,
            Self::Map(_) => Type::Map,
            Self::Function(_) => Type::Function,
            Self::Userinfo(Userinfo::Weak(_)) => Type::WeakUserinfo,
            Self::Userinfo(Userinfo::Strong(_)) => Type::StrongUserinfo,
        }
    }

    /// The name scripts observe through `typeof`.
    pub fn type_name(&self) -> &'static str {
        self.type_of().name()
    }

    /// The 16-bit wire type word of this value's type.
    pub fn type_word(&self) -> TypeWord {
        let (tag, flags) = match self.type_of() {
            Type::Nil => (Tag::Nil, TypeFlags::empty()),
            Type::Bool => (Tag::Bool, TypeFlags::empty()),
            Type::Int => (Tag::Number, TypeFlags::empty()),
            Type::Float => (Tag::Number, TypeFlags::FLOAT),
            Type::Str => (Tag::String, TypeFlags::OBJECT),
            Type::Array => (Tag::Array, TypeFlags::OBJECT),
            Type::Map => (Tag::Hashmap, TypeFlags::OBJECT),
            Type::Function => (Tag::Function, TypeFlags::OBJECT),
            Type::WeakUserinfo => (Tag::Userinfo, TypeFlags::empty()),
            Type::StrongUserinfo => (Tag::Userinfo, TypeFlags::OBJECT),
        };
        TypeWord::new(tag, flags)
    }

    /// Truthiness: nil, false and numeric zero are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Nil => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            _ => true,
        }
    }

    /// `true` for int and float.
    pub const fn is_number(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    /// Ordering between comparable values: two numbers, or two strings.
    pub fn try_compare(&self, other: &Self) -> Result<Ordering, ValueError> {
        let incomparable = || ValueError::NotComparable {
            lhs: self.type_of(),
            rhs: other.type_of(),
        };
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Ok(a.cmp(b)),
            (a, b) if a.is_number() && b.is_number() => a
                .as_f64()
                .partial_cmp(&b.as_f64())
                .ok_or_else(incomparable),
            (Self::Str(a), Self::Str(b)) => Ok(a.cmp(b)),
            _ => Err(incomparable()),
        }
    }

    /// Hash usable as a map key. Integral floats hash equal to their
    /// integer value so numeric keys alias across representations.
    pub fn hash_key(&self) -> Result<u64, ValueError> {
        match self {
            Self::Nil => Ok(splitmix64(0x6e69)),
            Self::Bool(b) => Ok(splitmix64(0x626f_6f6c ^ *b as u64)),
            Self::Int(i) => Ok(splitmix64(*i as u64)),
            Self::Float(f) => {
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                    Ok(splitmix64(*f as i64 as u64))
                } else {
                    Ok(splitmix64(f.to_bits()))
                }
            }
            Self::Str(s) => Ok(s.hash()),
            Self::Function(f) => Ok(splitmix64(Rc::as_ptr(f) as u64)),
            Self::Userinfo(u) => Ok(splitmix64(u.addr() as u64)),
            Self::Array(_) | Self::Map(_) => Err(ValueError::Unhashable(self.type_of())),
        }
    }

    fn as_f64(&self) -> f64 {
        match self {
            Self::Int(i) => *i as f64,
            Self::Float(f) => *f,
            _ => f64::NAN,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            // Numbers compare by numeric value across representations.
            (a, b) if a.is_number() && b.is_number() => a.as_f64() == b.as_f64(),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => Rc::ptr_eq(a, b),
            (Self::Map(a), Self::Map(b)) => Rc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Userinfo(a), Self::Userinfo(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("nil"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{x:.1}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => f.write_str(s.as_str()),
            Self::Array(a) => write!(f, "array({})", a.borrow().len()),
            Self::Map(m) => write!(f, "hashmap({})", m.borrow().len()),
            Self::Function(func) => write!(f, "<function {}>", func.name()),
            Self::Userinfo(_) => f.write_str("<userinfo>"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::string(s)
    }
}

impl From<Str> for Value {
    fn from(s: Str) -> Self {
        Self::Str(Rc::new(s))
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_compare_across_representations() {
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert_ne!(Value::Int(1), Value::Float(1.5));
        assert_eq!(
            Value::Int(2).try_compare(&Value::Float(2.5)),
            Ok(Ordering::Less)
        );
    }

    #[test]
    fn aggregates_compare_by_identity() {
        let a = Value::new_array();
        let b = a.clone();
        assert_eq!(a, b);
        assert_ne!(a, Value::new_array());
    }

    #[test]
    fn incomparable_pairs_error() {
        let err = Value::Int(1).try_compare(&Value::from("x")).unwrap_err();
        assert_eq!(
            err,
            ValueError::NotComparable {
                lhs: Type::Int,
                rhs: Type::Str
            }
        );
        assert!(Value::Nil.try_compare(&Value::Nil).is_err());
    }

    #[test]
    fn clone_then_drop_restores_refcount() {
        let v = Value::from("shared");
        let rc = match &v {
            Value::Str(s) => Rc::clone(s),
            _ => unreachable!(),
        };
        let before = Rc::strong_count(&rc);
        {
            let _copy = v.clone();
            assert_eq!(Rc::strong_count(&rc), before + 1);
        }
        assert_eq!(Rc::strong_count(&rc), before);
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(Value::Int(-1).is_truthy());
        assert!(Value::from("").is_truthy());
    }

    #[test]
    fn type_words_match_the_wire_layout() {
        use sparnel_asm::{Tag, TypeFlags};
        let tw = Value::Float(1.5).type_word();
        assert_eq!(tw.tag(), Some(Tag::Number));
        assert!(tw.flags().contains(TypeFlags::FLOAT));
        let tw = Value::from("s").type_word();
        assert_eq!(tw.tag(), Some(Tag::String));
        assert!(tw.flags().contains(TypeFlags::OBJECT));
        let tw = Value::Nil.type_word();
        assert_eq!(tw.flags(), TypeFlags::empty());
    }
}
