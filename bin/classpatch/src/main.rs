use classpatch::jvm::tree::ClassNode;
use classpatch::jvm::verifier::{verify_class, ObjectHierarchy};
use classpatch::transform::{self, DirectoryResources, Output, Pipeline, Settings};
use classpatch::*;

use clap::{crate_version, Arg, ArgAction, ArgMatches, Command};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

fn main() -> Result<(), transform::Error> {
    env_logger::init();

    let class_arg = Arg::new("CLASS")
        .help("Class file to read")
        .required(true)
        .index(1);

    let matches = Command::new("classpatch")
        .version(crate_version!())
        .about("Inspect, verify and patch JVM class files")
        .subcommand_required(true)
        .subcommand(
            Command::new("inspect")
                .about("Print the members and decoded code of a class")
                .arg(class_arg.clone()),
        )
        .subcommand(
            Command::new("verify")
                .about("Rewrite a class and report what the verifier finds")
                .arg(class_arg.clone()),
        )
        .subcommand(
            Command::new("transform")
                .about("Run a class through the load-time pipeline")
                .arg(class_arg)
                .arg(
                    Arg::new("name")
                        .long("name")
                        .value_name("CLASS_NAME")
                        .help("Name to load the class as (defaults to the name in the file)"),
                )
                .arg(
                    Arg::new("replace")
                        .long("replace")
                        .value_name("CLASS_NAME=PATH")
                        .action(ArgAction::Append)
                        .value_parser(parse_binding)
                        .help("Replace a class with a resource"),
                )
                .arg(
                    Arg::new("resources")
                        .long("resources")
                        .value_name("DIR")
                        .default_value(".")
                        .help("Directory replacement resources are relative to"),
                )
                .arg(
                    Arg::new("export")
                        .long("export")
                        .value_name("DIR")
                        .num_args(0..=1)
                        .default_missing_value(transform::DEFAULT_EXPORT_DIR)
                        .help("Also export rewritten classes under this directory"),
                )
                .arg(
                    Arg::new("verify")
                        .long("verify")
                        .action(ArgAction::SetTrue)
                        .help("Log verifier findings for rewritten classes"),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .help("Where to write the result (defaults to `<CLASS_NAME>.class`)"),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("inspect", sub)) => inspect(&read_class(sub)?),
        Some(("verify", sub)) => verify(&read_class(sub)?),
        Some(("transform", sub)) => run_pipeline(sub),
        _ => Ok(()),
    }
}

fn parse_binding(binding: &str) -> Result<(String, String), String> {
    match binding.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_owned(), path.to_owned()))
        }
        _ => Err(format!("expected `CLASS_NAME=PATH`, found `{}`", binding)),
    }
}

fn read_class(matches: &ArgMatches) -> Result<Vec<u8>, transform::Error> {
    let path = matches
        .get_one::<String>("CLASS")
        .map(String::as_str)
        .unwrap_or_default();
    log::info!("Reading '{}'", path);
    Ok(fs::read(path).map_err(jvm::Error::IoError)?)
}

fn inspect(bytes: &[u8]) -> Result<(), transform::Error> {
    let class = ClassNode::parse(bytes)?;
    println!("class {} ({:?})", class.name, class.version);
    if let Some(super_name) = &class.super_name {
        println!("  extends {}", super_name);
    }
    for interface in &class.interfaces {
        println!("  implements {}", interface);
    }
    for field in &class.fields {
        println!("  field {} {}", field.name, field.descriptor);
    }
    for method in &class.methods {
        println!("  method {}{}", method.name, method.descriptor);
        if let Some(code) = &method.code {
            for insn in &code.insns {
                match insn {
                    jvm::code::Insn::Label(_) => println!("    {}", insn),
                    _ => println!("      {}", insn),
                }
            }
        }
    }
    Ok(())
}

fn verify(bytes: &[u8]) -> Result<(), transform::Error> {
    let rewritten = ClassNode::parse(bytes)?.to_bytes(&ObjectHierarchy)?;
    let findings = verify_class(&rewritten, &ObjectHierarchy)?;
    for finding in &findings {
        println!("{}", finding);
    }
    if !findings.is_empty() {
        log::error!("{} verification findings", findings.len());
        process::exit(1);
    }
    Ok(())
}

fn run_pipeline(matches: &ArgMatches) -> Result<(), transform::Error> {
    let bytes = read_class(matches)?;
    let class_name = match matches.get_one::<String>("name") {
        Some(name) => name.replace('.', "/"),
        None => jvm::class_file::ClassFile::parse(&bytes)?.name()?.to_owned(),
    };

    let mut settings = Settings::new();
    settings.verify = matches.get_flag("verify");
    settings.export_dir = matches.get_one::<String>("export").map(PathBuf::from);

    let replacements: Vec<(String, String)> = matches
        .get_many::<(String, String)>("replace")
        .map(|bindings| bindings.cloned().collect())
        .unwrap_or_default();
    let resources = matches
        .get_one::<String>("resources")
        .map(String::as_str)
        .unwrap_or(".");

    let pipeline = Pipeline::new(
        settings,
        transform::setup_fn(move |registry| {
            for (name, path) in &replacements {
                registry.replace(name, path);
            }
            Ok(())
        }),
    )
    .with_resources(DirectoryResources::new(resources));

    let output = pipeline.transform(None, Some(class_name.as_str()), &bytes)?;
    match &output {
        Output::NoTransform | Output::PassThrough => log::info!("{} is unchanged", class_name),
        Output::Replaced(_) => log::info!("{} was replaced", class_name),
        Output::Rewritten(_) => log::info!("{} was rewritten", class_name),
    }
    let result = output.bytes().unwrap_or(&bytes);

    let output_file = match matches.get_one::<String>("output") {
        Some(file) => PathBuf::from(file),
        None => PathBuf::from(format!("{}.class", class_name)),
    };
    log::info!("Writing '{}'", output_file.display());
    write_file(&output_file, result).map_err(jvm::Error::IoError)?;
    Ok(())
}

fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)
}
