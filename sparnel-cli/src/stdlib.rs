//! Seed library: native functions registered into every CLI context.
//!
//! Each native validates its arguments and reports failures through the
//! native error channel, which the VM surfaces as a runtime fault.

use sparnel_types::{NativeError, Value};
use sparnel_vm::Context;

/// Register the whole seed library.
pub fn register(ctx: &mut Context) {
    ctx.register_native("print", |args| {
        print_values(args);
        Ok(Value::Nil)
    });
    ctx.register_native("println", |args| {
        print_values(args);
        println!();
        Ok(Value::Nil)
    });

    ctx.register_native("type", |args| match args {
        [v] => Ok(Value::string(v.type_name())),
        _ => Err(arity("type", 1, args.len())),
    });

    ctx.register_native("len", |args| match args {
        [Value::Str(s)] => Ok(Value::Int(s.len() as i64)),
        [Value::Array(a)] => Ok(Value::Int(a.borrow().len() as i64)),
        [Value::Map(m)] => Ok(Value::Int(m.borrow().len() as i64)),
        [other] => Err(NativeError::new(format!(
            "cannot take the length of a {}",
            other.type_name()
        ))),
        _ => Err(arity("len", 1, args.len())),
    });

    ctx.register_native("push", |args| match args {
        [Value::Array(a), value] => {
            a.borrow_mut()
                .push(value.clone())
                .map_err(|e| NativeError::new(e.to_string()))?;
            Ok(Value::Nil)
        }
        [other, _] => Err(NativeError::new(format!(
            "cannot push onto a {}",
            other.type_name()
        ))),
        _ => Err(arity("push", 2, args.len())),
    });

    ctx.register_native("pop", |args| match args {
        [Value::Array(a)] => Ok(a.borrow_mut().pop().unwrap_or(Value::Nil)),
        [other] => Err(NativeError::new(format!(
            "cannot pop from a {}",
            other.type_name()
        ))),
        _ => Err(arity("pop", 1, args.len())),
    });

    ctx.register_native("abs", |args| match args {
        [Value::Int(i)] => Ok(Value::Int(i.wrapping_abs())),
        [Value::Float(f)] => Ok(Value::Float(f.abs())),
        _ => Err(number_expected("abs", args)),
    });
    ctx.register_native("floor", |args| match args {
        [Value::Int(i)] => Ok(Value::Int(*i)),
        [Value::Float(f)] => Ok(Value::Float(f.floor())),
        _ => Err(number_expected("floor", args)),
    });
    ctx.register_native("ceil", |args| match args {
        [Value::Int(i)] => Ok(Value::Int(*i)),
        [Value::Float(f)] => Ok(Value::Float(f.ceil())),
        _ => Err(number_expected("ceil", args)),
    });
    ctx.register_native("sqrt", |args| match args {
        [Value::Int(i)] => Ok(Value::Float((*i as f64).sqrt())),
        [Value::Float(f)] => Ok(Value::Float(f.sqrt())),
        _ => Err(number_expected("sqrt", args)),
    });

    ctx.register_native("substr", |args| match args {
        [Value::Str(s), Value::Int(start), Value::Int(len)] => {
            let text = s.as_str();
            let start = usize::try_from(*start)
                .map_err(|_| NativeError::new("substr: negative start"))?;
            let len =
                usize::try_from(*len).map_err(|_| NativeError::new("substr: negative length"))?;
            let end = start.saturating_add(len).min(text.len());
            match text.get(start.min(text.len())..end) {
                Some(slice) => Ok(Value::string(slice)),
                None => Err(NativeError::new("substr: range splits a character")),
            }
        }
        _ => Err(NativeError::new("substr expects (string, int, int)")),
    });

    ctx.register_native("toint", |args| match args {
        [Value::Int(i)] => Ok(Value::Int(*i)),
        [Value::Float(f)] => Ok(Value::Int(*f as i64)),
        [Value::Str(s)] => s
            .as_str()
            .trim()
            .parse()
            .map(Value::Int)
            .map_err(|_| NativeError::new(format!("toint: cannot parse {:?}", s.as_str()))),
        _ => Err(NativeError::new("toint expects a number or a string")),
    });
    ctx.register_native("tofloat", |args| match args {
        [Value::Int(i)] => Ok(Value::Float(*i as f64)),
        [Value::Float(f)] => Ok(Value::Float(*f)),
        [Value::Str(s)] => s
            .as_str()
            .trim()
            .parse()
            .map(Value::Float)
            .map_err(|_| NativeError::new(format!("tofloat: cannot parse {:?}", s.as_str()))),
        _ => Err(NativeError::new("tofloat expects a number or a string")),
    });
    ctx.register_native("tostring", |args| match args {
        [v] => Ok(Value::string(v.to_string())),
        _ => Err(arity("tostring", 1, args.len())),
    });
}

fn print_values(args: &[Value]) {
    for (i, value) in args.iter().enumerate() {
        if i > 0 {
            print!(" ");
        }
        print!("{value}");
    }
}

fn arity(name: &str, want: usize, got: usize) -> NativeError {
    NativeError::new(format!("{name} expects {want} argument(s), got {got}"))
}

fn number_expected(name: &str, args: &[Value]) -> NativeError {
    match args {
        [other] => NativeError::new(format!("{name} expects a number, got {}", other.type_name())),
        _ => arity(name, 1, args.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparnel_vm::Context;

    fn ctx() -> Context {
        let mut ctx = Context::new();
        register(&mut ctx);
        ctx
    }

    #[test]
    fn conversions() {
        let mut ctx = ctx();
        assert_eq!(
            ctx.eval_source("return toint(\" 42 \");").unwrap(),
            Value::Int(42)
        );
        assert_eq!(
            ctx.eval_source("return tofloat(2);").unwrap(),
            Value::Float(2.0)
        );
        assert_eq!(
            ctx.eval_source("return tostring(1 + 1) .. \"!\";").unwrap(),
            Value::from("2!")
        );
    }

    #[test]
    fn array_helpers() {
        let mut ctx = ctx();
        assert_eq!(
            ctx.eval_source("var a = { 1, 2 }; push(a, 3); return len(a);")
                .unwrap(),
            Value::Int(3)
        );
        assert_eq!(
            ctx.eval_source("var a = { 1, 2 }; return pop(a);").unwrap(),
            Value::Int(2)
        );
    }

    #[test]
    fn math_helpers() {
        let mut ctx = ctx();
        assert_eq!(ctx.eval_source("return abs(-3);").unwrap(), Value::Int(3));
        assert_eq!(
            ctx.eval_source("return floor(2.7);").unwrap(),
            Value::Float(2.0)
        );
        assert_eq!(
            ctx.eval_source("return sqrt(49);").unwrap(),
            Value::Float(7.0)
        );
    }

    #[test]
    fn substr_bounds() {
        let mut ctx = ctx();
        assert_eq!(
            ctx.eval_source("return substr(\"sparnel\", 0, 4);").unwrap(),
            Value::from("spar")
        );
        assert_eq!(
            ctx.eval_source("return substr(\"abc\", 1, 99);").unwrap(),
            Value::from("bc")
        );
        assert!(ctx.eval_source("return substr(\"abc\", 0 - 1, 1);").is_err());
    }

    #[test]
    fn bad_arguments_become_runtime_faults() {
        let mut ctx = ctx();
        let err = ctx.eval_source("return len(1);").unwrap_err();
        assert!(err.to_string().contains("len"));
    }
}
