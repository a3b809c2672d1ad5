mod common;

use classpatch::dsl::{InsnBuilder, JumpCondition, LocalKind};
use classpatch::jvm::class_file::{ClassFile, Constant};
use classpatch::jvm::code::opcodes::*;
use classpatch::jvm::code::{Insn, MemberRef};
use classpatch::jvm::tree::{ClassNode, FieldNode, MethodNode};
use classpatch::jvm::verifier::{verify_class, MapHierarchy, ObjectHierarchy};
use classpatch::jvm::{FieldAccessFlags, MethodAccessFlags};
use classpatch::transform::*;
use common::{init_logging, widget_class};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn field_names(bytes: &[u8]) -> Vec<String> {
    ClassNode::parse(bytes)
        .unwrap()
        .fields
        .into_iter()
        .map(|field| field.name)
        .collect()
}

fn add_field(class_name: &str, name: &'static str) -> impl ClassWriter {
    writer_fn(class_name, move |class| {
        class
            .fields
            .push(FieldNode::new(FieldAccessFlags::PUBLIC, name, "I"));
        Ok(())
    })
}

/// Fails unless the class already has a field with the given name
fn require_field(class_name: &str, name: &'static str) -> impl ClassWriter {
    let owner = class_name.to_owned();
    writer_fn(class_name, move |class| {
        if class.fields.iter().any(|field| field.name == name) {
            Ok(())
        } else {
            Err(Error::Writer {
                class_name: owner.clone(),
                message: format!("no field {}", name),
            })
        }
    })
}

#[test]
fn nothing_to_transform() {
    init_logging();
    let pipeline = Pipeline::new(Settings::new(), setup_fn(|_| Ok(())));
    let bytes = widget_class();

    assert_eq!(
        pipeline.transform(None, None, &bytes).unwrap(),
        Output::NoTransform
    );
    assert_eq!(
        pipeline.transform(None, Some("a/Widget"), &[]).unwrap(),
        Output::NoTransform
    );
    assert!(!pipeline.is_configured());
}

#[test]
fn unbound_classes_pass_through() {
    init_logging();
    let pipeline = Pipeline::new(
        Settings::new(),
        setup_fn(|registry| {
            registry.add_writer(add_field("a/Other", "marker"));
            Ok(())
        }),
    );

    let output = pipeline
        .transform(Some("app"), Some("a.Widget"), &widget_class())
        .unwrap();
    assert_eq!(output, Output::PassThrough);
    assert_eq!(output.bytes(), None);
    assert!(pipeline.is_configured());
}

#[test]
fn protected_classes_are_never_rewritten() {
    init_logging();
    let mut settings = Settings::new();
    settings.protected_prefixes.push(String::from("a/"));
    let pipeline = Pipeline::new(
        settings,
        setup_fn(|registry| {
            registry.add_writer(add_field("a/Widget", "marker"));
            Ok(())
        }),
    );

    let output = pipeline
        .transform(None, Some("a/Widget"), &widget_class())
        .unwrap();
    assert_eq!(output, Output::PassThrough);
    assert!(!pipeline.is_configured());
}

#[test]
fn replacements_ignore_the_original_bytes() {
    init_logging();
    let replacement = widget_class();
    let mut resources = HashMap::new();
    resources.insert(String::from("patches/Widget.class"), replacement.clone());

    let pipeline = Pipeline::new(
        Settings::new(),
        setup_fn(|registry| {
            registry
                .replace("a/Widget", "patches/Widget.class")
                .replace("a/Missing", "patches/Missing.class")
                .add_writer(add_field("a/Widget", "ignored"));
            Ok(())
        }),
    )
    .with_resources(resources);

    let output = pipeline
        .transform(None, Some("a/Widget"), &[1, 2, 3])
        .unwrap();
    assert_eq!(output, Output::Replaced(replacement));

    match pipeline.transform(None, Some("a/Missing"), &[1, 2, 3]) {
        Err(Error::ResourceLoad {
            class_name, path, ..
        }) => {
            assert_eq!(class_name, "a/Missing");
            assert_eq!(path, "patches/Missing.class");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn writers_apply_in_registration_order() {
    init_logging();
    let pipeline = Pipeline::new(
        Settings::new(),
        setup_fn(|registry| {
            registry
                .add_writer(add_field("a/Widget", "marker"))
                .add_writer(require_field("a/Widget", "marker"))
                .add_writer(add_field("a/Widget", "seen"));
            Ok(())
        }),
    );

    let output = pipeline
        .transform(None, Some("a/Widget"), &widget_class())
        .unwrap();
    match output {
        Output::Rewritten(bytes) => assert_eq!(field_names(&bytes), vec!["marker", "seen"]),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn failing_writers_leave_the_class_alone() {
    init_logging();
    let pipeline = Pipeline::new(
        Settings::new(),
        setup_fn(|registry| {
            registry
                .add_writer(require_field("a/Widget", "marker"))
                .add_writer(add_field("a/Widget", "marker"))
                .add_writer(add_field("a/Broken", "marker"));
            Ok(())
        }),
    );

    let output = pipeline
        .transform(None, Some("a/Widget"), &widget_class())
        .unwrap();
    assert_eq!(output, Output::PassThrough);

    // Not a class at all
    let output = pipeline
        .transform(None, Some("a/Broken"), &[0xCA, 0xFE, 0xBA, 0xBE, 0])
        .unwrap();
    assert_eq!(output, Output::PassThrough);
}

#[test]
fn setup_failures_keep_earlier_registrations() {
    init_logging();
    let pipeline = Pipeline::new(
        Settings::new(),
        setup_fn(|registry| {
            registry.add_writer(add_field("a/Widget", "marker"));
            Err(Error::Setup(String::from("plugin missing")))
        }),
    );

    let output = pipeline
        .transform(None, Some("a/Widget"), &widget_class())
        .unwrap();
    assert!(matches!(output, Output::Rewritten(_)));
}

#[test]
fn setup_panics_keep_earlier_registrations() {
    init_logging();
    let pipeline = Pipeline::new(
        Settings::new(),
        setup_fn(|registry| {
            registry.add_writer(add_field("a/Widget", "marker"));
            panic!("plugin blew up");
        }),
    );

    let output = pipeline
        .transform(None, Some("a/Widget"), &widget_class())
        .unwrap();
    assert!(pipeline.is_configured());
    let bytes = output.bytes().unwrap();
    assert!(field_names(bytes).contains(&String::from("marker")));

    // Setup isn't retried
    let output = pipeline
        .transform(None, Some("a/Widget"), &widget_class())
        .unwrap();
    assert!(matches!(output, Output::Rewritten(_)));
}

#[test]
fn setup_runs_once_under_contention() {
    init_logging();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let pipeline = Pipeline::new(
        Settings::new(),
        setup_fn(move |registry| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            registry.add_writer(add_field("a/Widget", "marker"));
            Ok(())
        }),
    );

    let bytes = widget_class();
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|_| scope.spawn(|| pipeline.transform(None, Some("a/Widget"), &bytes)))
            .collect();
        for handle in handles {
            let output = handle.join().unwrap().unwrap();
            assert!(matches!(output, Output::Rewritten(_)));
        }
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn injected_code_is_verified_and_exported() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let export_dir = dir.path().join("classes");

    let mut settings = Settings::new();
    settings.verify = true;
    settings.export_dir = Some(export_dir.clone());
    let pipeline = Pipeline::new(
        settings,
        setup_fn(|registry| {
            registry.add_writer(MethodInjector::new(
                "a/Widget",
                "size",
                "(I)I",
                InjectAt::Head,
                |b| {
                    b.invoke_static("a/Hooks", "onSize", "()V");
                    Ok(())
                },
            ));
            Ok(())
        }),
    );

    let output = pipeline
        .transform(None, Some("a/Widget"), &widget_class())
        .unwrap();
    let bytes = output.bytes().unwrap().to_vec();

    let class = ClassNode::parse(&bytes).unwrap();
    let code = class.method("size", "(I)I").unwrap().code.as_ref().unwrap();
    assert_eq!(
        code.insns.iter().find(|insn| insn.is_real()),
        Some(&Insn::Method {
            opcode: INVOKESTATIC,
            member: MemberRef::new("a/Hooks", "onSize", "()V"),
            is_interface: false,
        })
    );

    let exported = std::fs::read(export_dir.join("a/Widget.class")).unwrap();
    assert_eq!(exported, bytes);
}

#[test]
fn injected_wide_scratch_locals_survive_branches() {
    init_logging();
    let mut settings = Settings::new();
    settings.verify = true;
    let pipeline = Pipeline::new(
        settings,
        setup_fn(|registry| {
            registry.add_writer(MethodInjector::new(
                "a/Widget",
                "size",
                "(I)I",
                InjectAt::Head,
                |b| {
                    b.aconst_null();
                    let tag = b.astore_new();
                    b.long(7);
                    let total = b.lstore_new();
                    b.load_index(LocalKind::Int, 0);
                    b.if_clause(&[JumpCondition::IfEq], |b| {
                        b.string("hit").store(tag);
                        Ok(())
                    })?;
                    b.load(total).invoke_static("a/Hooks", "onTotal", "(J)V");
                    Ok(())
                },
            ));
            Ok(())
        }),
    );

    let output = pipeline
        .transform(None, Some("a/Widget"), &widget_class())
        .unwrap();
    let bytes = output.bytes().expect("class should have been rewritten");
    let findings = verify_class(bytes, &ObjectHierarchy).unwrap();
    assert!(findings.is_empty(), "{:?}", findings);

    let class = ClassNode::parse(bytes).unwrap();
    let code = class.method("size", "(I)I").unwrap().code.as_ref().unwrap();
    assert_eq!(code.max_locals, 4);
}

#[test]
fn frames_merge_through_the_configured_hierarchy() {
    init_logging();
    let mut hierarchy = MapHierarchy::new();
    hierarchy
        .insert("a/Circle", "a/Shape")
        .insert("a/Square", "a/Shape");

    let pipeline = Pipeline::new(
        Settings::new(),
        setup_fn(|registry| {
            registry.add_writer(writer_fn("a/Widget", |class| {
                // `static Shape pick(int)` returning a new circle or square
                let mut method = MethodNode::new(
                    MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
                    "pick",
                    "(I)La/Shape;",
                );
                let mut b = InsnBuilder::new(1);
                b.load_index(LocalKind::Int, 0);
                b.if_else(
                    &[JumpCondition::IfNe],
                    |b| {
                        b.create_instance("a/Circle", "()V", |_| Ok(()))?;
                        Ok(())
                    },
                    |b| {
                        b.create_instance("a/Square", "()V", |_| Ok(()))?;
                        Ok(())
                    },
                )?;
                b.areturn();
                method.code_mut().insns = b.build()?;
                class.methods.push(method);
                Ok(())
            }));
            Ok(())
        }),
    )
    .with_hierarchy(hierarchy);

    let output = pipeline
        .transform(None, Some("a/Widget"), &widget_class())
        .unwrap();
    let class_file = ClassFile::parse(output.bytes().unwrap()).unwrap();
    let class_names: Vec<&str> = class_file
        .constants
        .iter()
        .filter_map(|(_, constant)| match constant {
            Constant::Class(name) => class_file.constants.utf8(*name).ok(),
            _ => None,
        })
        .collect();

    // Only the stack map frame after the join mentions the common super class
    assert!(class_names.contains(&"a/Shape"), "{:?}", class_names);
}
