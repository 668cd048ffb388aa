///
/// JS Interface Legalization Integration Tests
///
/// Builds small modules in memory, legalizes them, and checks the result
/// both structurally and by evaluating it: a legalized export called with
/// split/widened arguments must produce the same value as the original
/// function, and a legalized import must receive exactly what the host
/// expects.
///
/// Run all:  `cargo test --test legalize`
///

use std::cell::Cell;
use std::rc::Rc;

use wasm_legalize::interp::{demote_f64, promote_f32};
use wasm_legalize::ir::{
    BinaryOp, Builder, Expression, Export, Function, Literal, Module, Name, Segment, Signature, Table,
    ValType,
};
use wasm_legalize::passes::legalize::{is_illegal, ChannelOrigin};
use wasm_legalize::{
    legalize_js_interface, print_module, HostFunctions, Instance, PassError, PassOptions, PassRunner,
};

const I64_SAMPLES: [i64; 7] = [0, -1, 1, i64::MIN, i64::MAX, 0x1_0000_0000, 0xffff_ffff];

fn split(v: i64) -> (Literal, Literal) {
    (Literal::I32(v as i32), Literal::I32((v >> 32) as i32))
}

fn join(low: i32, high: i32) -> i64 {
    (low as u32 as i64) | ((high as u32 as i64) << 32)
}

fn sig(params: &[ValType], result: Option<ValType>) -> Signature {
    Signature::new(params.iter().copied(), result)
}

/// `add(a: i64, b: i64) -> i64` and `same(x: f32) -> f32`, both exported.
fn arithmetic_module() -> Module {
    let mut module = Module::new();
    module
        .add_function(Function::defined(
            "add",
            sig(&[ValType::I64, ValType::I64], Some(ValType::I64)),
            vec![],
            Builder::binary(
                BinaryOp::AddInt64,
                Builder::local_get(0, ValType::I64),
                Builder::local_get(1, ValType::I64),
            ),
        ))
        .unwrap();
    module
        .add_function(Function::defined(
            "same",
            sig(&[ValType::F32], Some(ValType::F32)),
            vec![],
            Builder::local_get(0, ValType::F32),
        ))
        .unwrap();
    module.add_export(Export::function("add", "add")).unwrap();
    module.add_export(Export::function("same", "same")).unwrap();
    module
}

/// Imports the channel from the host and one illegal function `env.twice(i64) -> i64`.
fn host_module() -> Module {
    let mut module = Module::new();
    module
        .add_function(Function::imported(
            "getTempRet0",
            sig(&[], Some(ValType::I32)),
            "env",
            "getTempRet0",
        ))
        .unwrap();
    module
        .add_function(Function::imported(
            "setTempRet0",
            sig(&[ValType::I32], None),
            "env",
            "setTempRet0",
        ))
        .unwrap();
    module
        .add_function(Function::imported(
            "twice",
            sig(&[ValType::I64], Some(ValType::I64)),
            "env",
            "twice",
        ))
        .unwrap();
    module
        .add_function(Function::defined(
            "call_twice",
            sig(&[ValType::I64], Some(ValType::I64)),
            vec![],
            Builder::call(
                Name::new("twice"),
                vec![Builder::local_get(0, ValType::I64)],
                Some(ValType::I64),
            ),
        ))
        .unwrap();
    module
        .add_function(Function::defined(
            "call_slot",
            sig(&[ValType::I64], Some(ValType::I64)),
            vec![],
            Expression::CallIndirect {
                index: Box::new(Builder::constant(Literal::I32(1))),
                operands: vec![Builder::local_get(0, ValType::I64)],
                sig: sig(&[ValType::I64], Some(ValType::I64)),
            },
        ))
        .unwrap();
    module.add_export(Export::function("call_twice", "call_twice")).unwrap();
    module.add_export(Export::function("call_slot", "call_slot")).unwrap();
    module.table = Table {
        segments: vec![Segment {
            offset: 0,
            data: vec![Name::new("call_twice"), Name::new("twice")],
        }],
    };
    module
}

/// Host side of `host_module`: `twice` works on the (low, high) pair and
/// leaves the high word of its result in the shared cell.
fn host(high: Rc<Cell<i32>>, calls: Rc<Cell<usize>>) -> HostFunctions {
    let mut host = HostFunctions::new();
    let get = high.clone();
    let set = high.clone();
    host.register("env", "getTempRet0", move |_| Ok(Some(Literal::I32(get.get()))))
        .register("env", "setTempRet0", move |args| {
            set.set(args[0].as_i32().unwrap_or_default());
            Ok(None)
        })
        .register("env", "twice", move |args| {
            calls.set(calls.get() + 1);
            let (low, hi) = (args[0].as_i32().unwrap(), args[1].as_i32().unwrap());
            let result = join(low, hi).wrapping_mul(2);
            high.set((result >> 32) as i32);
            Ok(Some(Literal::I32(result as i32)))
        });
    host
}

#[test]
fn test_exports_preserve_i64_semantics() {
    let original = arithmetic_module();
    let mut module = original.clone();
    let summary = legalize_js_interface(&mut module).unwrap();
    assert_eq!(summary.channel.origin, ChannelOrigin::Created);
    assert!(summary.channel.register.is_some());

    let mut before = Instance::new(&original, HostFunctions::new());
    let mut after = Instance::new(&module, HostFunctions::new());
    for a in I64_SAMPLES {
        for b in [0, -1, i64::MAX] {
            let expected = before
                .invoke_export("add", &[Literal::I64(a), Literal::I64(b)])
                .unwrap()
                .and_then(|v| v.as_i64())
                .unwrap();

            let (a_lo, a_hi) = split(a);
            let (b_lo, b_hi) = split(b);
            let low = after
                .invoke_export("add", &[a_lo, a_hi, b_lo, b_hi])
                .unwrap()
                .and_then(|v| v.as_i32())
                .unwrap();
            let high = after.global("tempRet0").and_then(|v| v.as_i32()).unwrap();
            assert_eq!(join(low, high), expected, "add({a}, {b})");
        }
    }
}

#[test]
fn test_exports_preserve_f32_bits() {
    let mut module = arithmetic_module();
    legalize_js_interface(&mut module).unwrap();
    let mut instance = Instance::new(&module, HostFunctions::new());

    let samples = [
        0.0f32.to_bits(),
        (-0.0f32).to_bits(),
        f32::MIN.to_bits(),
        f32::MAX.to_bits(),
        f32::MIN_POSITIVE.to_bits(),
        1,
        f32::INFINITY.to_bits(),
        f32::NEG_INFINITY.to_bits(),
        f32::NAN.to_bits(),
        0x7fa0_0001,
        0xffc0_0001,
    ];
    for bits in samples {
        let widened = Literal::F64(promote_f32(bits));
        let result = instance.invoke_export("same", &[widened]).unwrap().unwrap();
        let Literal::F64(out) = result else {
            panic!("expected f64, got {result:?}");
        };
        assert_eq!(demote_f64(out), bits, "bits {bits:#010x}");
    }
}

#[test]
fn test_split_and_widen_roundtrip() {
    for v in I64_SAMPLES {
        let (Literal::I32(low), Literal::I32(high)) = split(v) else {
            unreachable!()
        };
        assert_eq!(join(low, high), v);
    }
    for bits in [0u32, 0x8000_0000, 0x7f7f_ffff, 0x0000_0001, 0x7f80_0000, 0x7fc0_0000, 0x7f80_0001] {
        assert_eq!(demote_f64(promote_f32(bits)), bits);
    }
}

#[test]
fn test_imports_and_table_through_host() {
    let mut module = host_module();
    let summary = legalize_js_interface(&mut module).unwrap();
    assert_eq!(summary.channel.origin, ChannelOrigin::Imported);
    assert_eq!(summary.import_stubs, 1);
    assert!(module.global("tempRet0").is_none());
    assert!(module.validate().is_ok());

    let high = Rc::new(Cell::new(0));
    let calls = Rc::new(Cell::new(0));
    let mut instance = Instance::new(&module, host(high.clone(), calls.clone()));
    for v in I64_SAMPLES {
        for export in ["call_twice", "call_slot"] {
            let (low_in, high_in) = split(v);
            let low = instance
                .invoke_export(export, &[low_in, high_in])
                .unwrap()
                .and_then(|r| r.as_i32())
                .unwrap();
            assert_eq!(join(low, high.get()), v.wrapping_mul(2), "{export}({v})");
        }
    }
    assert_eq!(calls.get(), 2 * I64_SAMPLES.len());
}

#[test]
fn test_legalized_surface_is_legal() {
    let mut module = host_module();
    legalize_js_interface(&mut module).unwrap();

    for export in module.exports() {
        let target = module.function(&export.value).unwrap();
        assert!(!is_illegal(&target.sig), "export {} is still illegal", export.name);
    }
    for func in module.functions().filter(|f| f.is_imported()) {
        assert!(!is_illegal(&func.sig), "import {} is still illegal", func.name);
    }
}

#[test]
fn test_second_run_changes_nothing() {
    for build in [arithmetic_module as fn() -> Module, host_module] {
        let mut module = build();
        legalize_js_interface(&mut module).unwrap();
        let once = module.clone();

        let summary = legalize_js_interface(&mut module).unwrap();
        assert_eq!(module, once);
        assert_eq!(summary.export_stubs, 0);
        assert_eq!(summary.import_stubs, 0);
        assert_eq!(summary.redirected_calls, 0);
    }
}

#[test]
fn test_table_never_names_removed_import() {
    let mut module = host_module();
    module.table.segments.push(Segment {
        offset: 5,
        data: vec![Name::new("twice"), Name::new("call_slot"), Name::new("twice")],
    });
    legalize_js_interface(&mut module).unwrap();

    assert!(!module.has_function("twice"));
    let entries: Vec<&str> = module.table.entries().map(|n| n.as_str()).collect();
    assert_eq!(
        entries,
        ["call_twice", "legalfunc$twice", "legalfunc$twice", "call_slot", "legalfunc$twice"]
    );
}

#[test]
fn test_half_channel_is_fatal_and_leaves_module_alone() {
    let mut module = host_module();
    module.remove_function("setTempRet0").unwrap();
    let before = module.clone();

    let err = legalize_js_interface(&mut module).unwrap_err();
    assert!(matches!(err, PassError::InconsistentChannel { ref present, .. } if present == "getTempRet0"));
    assert_eq!(module, before);

    let mut module = arithmetic_module();
    module
        .add_function(Function::defined("set", sig(&[ValType::I32], None), vec![], Expression::Nop))
        .unwrap();
    module.add_export(Export::function("setTempRet0", "set")).unwrap();
    let before = module.clone();

    let mut runner = PassRunner::new(PassOptions { validate: true, ..Default::default() });
    runner.add_by_name("legalize-js-interface").unwrap();
    let err = runner.run(&mut module).unwrap_err();
    assert!(matches!(err, PassError::InconsistentChannel { ref present, .. } if present == "setTempRet0"));
    assert_eq!(module, before);
}

#[test]
fn test_three_call_sites_follow_stub() {
    let mut module = Module::new();
    module
        .add_function(Function::imported("emit", sig(&[ValType::I64], None), "env", "emit"))
        .unwrap();
    for name in ["a", "b", "c"] {
        module
            .add_function(Function::defined(
                name,
                sig(&[], None),
                vec![],
                Builder::call(Name::new("emit"), vec![Builder::constant(Literal::I64(1))], None),
            ))
            .unwrap();
    }

    let mut runner = PassRunner::new(PassOptions {
        threads: Some(3),
        validate: true,
        ..Default::default()
    });
    runner.add_by_name("legalize-js-interface").unwrap();
    runner.run(&mut module).unwrap();

    for name in ["a", "b", "c"] {
        let func = module.function(name).unwrap();
        assert!(func.calls("legalfunc$emit"), "{name} was not redirected");
        assert!(!func.calls("emit"));
    }
    let stub = module.function("legalfunc$emit").unwrap();
    assert!(stub.calls("legalimport$emit"));
    let legal = module.function("legalimport$emit").unwrap();
    assert_eq!(legal.sig, sig(&[ValType::I32, ValType::I32], None));
    assert_eq!(legal.import().map(|l| l.base.as_str()), Some("emit"));
}

#[test]
fn test_export_of_illegal_import() {
    let mut module = host_module();
    module.add_export(Export::function("twice", "twice")).unwrap();
    legalize_js_interface(&mut module).unwrap();
    assert!(module.validate().is_ok());

    assert_eq!(module.export("twice").unwrap().value, "legalstub$twice");
    let stub = module.function("legalstub$twice").unwrap();
    assert!(stub.calls("legalfunc$twice"));

    let high = Rc::new(Cell::new(0));
    let mut instance = Instance::new(&module, host(high.clone(), Rc::new(Cell::new(0))));
    let (low_in, high_in) = split(-3);
    let low = instance
        .invoke_export("twice", &[low_in, high_in])
        .unwrap()
        .and_then(|r| r.as_i32())
        .unwrap();
    assert_eq!(join(low, high.get()), -6);
}

#[test]
fn test_printed_f32_stub() {
    let mut module = Module::new();
    module
        .add_function(Function::defined(
            "f",
            sig(&[ValType::F32], Some(ValType::F32)),
            vec![],
            Builder::local_get(0, ValType::F32),
        ))
        .unwrap();
    module.add_export(Export::function("f", "f")).unwrap();
    legalize_js_interface(&mut module).unwrap();

    insta::assert_snapshot!(print_module(&module), @r#"
    (module
      (global $tempRet0 (mut i32) (i32.const 0))
      (export "f" (func $legalstub$f))
      (export "getTempRet0" (func $getTempRet0))
      (export "setTempRet0" (func $setTempRet0))
      (func $f (param f32) (result f32)
        (local.get $0)
      )
      (func $getTempRet0 (result i32)
        (global.get $tempRet0)
      )
      (func $setTempRet0 (param i32)
        (global.set $tempRet0
          (local.get $0)
        )
      )
      (func $legalstub$f (param f64) (result f64)
        (f64.promote_f32
          (call $f
            (f32.demote_f64
              (local.get $0)
            )
          )
        )
      )
    )
    "#);
}

#[test]
fn test_f32_import_preserves_bits_through_host() {
    let mut module = Module::new();
    module
        .add_function(Function::imported("h", sig(&[ValType::F32], Some(ValType::F32)), "env", "h"))
        .unwrap();
    module
        .add_function(Function::defined(
            "call_h",
            sig(&[ValType::F32], Some(ValType::F32)),
            vec![],
            Builder::call(
                Name::new("h"),
                vec![Builder::local_get(0, ValType::F32)],
                Some(ValType::F32),
            ),
        ))
        .unwrap();
    legalize_js_interface(&mut module).unwrap();
    assert!(module.function("call_h").unwrap().calls("legalfunc$h"));

    let expected = Rc::new(Cell::new(0u64));
    let seen = expected.clone();
    let mut host = HostFunctions::new();
    host.register("env", "h", move |args| {
        assert_eq!(args, [Literal::F64(seen.get())]);
        Ok(Some(args[0]))
    });
    let mut instance = Instance::new(&module, host);

    let samples = [
        0x7fc0_0000u32,
        0x7fa0_0001,
        0.0f32.to_bits(),
        (-0.0f32).to_bits(),
        f32::INFINITY.to_bits(),
        f32::NEG_INFINITY.to_bits(),
        f32::MAX.to_bits(),
        f32::MIN.to_bits(),
    ];
    for bits in samples {
        expected.set(promote_f32(bits));
        let out = instance.invoke("call_h", &[Literal::F32(bits)]).unwrap();
        assert_eq!(out, Some(Literal::F32(bits)), "bits {bits:#010x}");
    }
}

#[test]
fn test_i64_import_under_created_channel() {
    let mut module = Module::new();
    module
        .add_function(Function::imported("now", sig(&[], Some(ValType::I64)), "env", "now"))
        .unwrap();
    module
        .add_function(Function::defined(
            "read_now",
            sig(&[], Some(ValType::I64)),
            vec![],
            Builder::call(Name::new("now"), vec![], Some(ValType::I64)),
        ))
        .unwrap();
    let summary = legalize_js_interface(&mut module).unwrap();
    assert_eq!(summary.channel.origin, ChannelOrigin::Created);
    assert_eq!(summary.channel.register.as_deref(), Some("tempRet0"));

    let clock = Rc::new(Cell::new(0i64));
    let reading = clock.clone();
    let mut host = HostFunctions::new();
    host.register_with_globals("env", "now", move |args, globals| {
        assert!(args.is_empty());
        let (low, high) = split(reading.get());
        globals.set("tempRet0", high)?;
        Ok(Some(low))
    });
    let mut instance = Instance::new(&module, host);

    for v in I64_SAMPLES {
        clock.set(v);
        assert_eq!(instance.invoke("read_now", &[]), Ok(Some(Literal::I64(v))), "now() = {v}");
    }
}
