use bc2cpp::bytecode::BytecodeFile;
use bc2cpp::*;

use clap::{crate_version, value_parser, Arg, ArgAction, Command};
use std::fs;
use std::path::PathBuf;

fn main() -> Result<(), translate::Error> {
    env_logger::init();

    let matches = Command::new("Bytecode to C++ converter")
        .version(crate_version!())
        .about("Convert compiled bytecode programs into block-threaded C++")
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .action(ArgAction::Set)
                .value_parser(value_parser!(PathBuf))
                .help("Output C++ file (defaults to the input name, with a `.cpp` extension)"),
        )
        .arg(
            Arg::new("namespace")
                .long("namespace")
                .value_name("NAMESPACE")
                .action(ArgAction::Set)
                .help("Namespace of the runtime (eg. `lobster`)"),
        )
        .arg(
            Arg::new("include")
                .long("include")
                .value_name("HEADER")
                .action(ArgAction::Append)
                .help("Header to include in the output (replaces the defaults, repeatable)"),
        )
        .arg(
            Arg::new("INPUT")
                .help("Sets the input bytecode file to use")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .index(1),
        )
        .get_matches();

    let mut settings = translate::Settings::new();
    if let Some(namespace) = matches.get_one::<String>("namespace") {
        settings.set_runtime_namespace(namespace)?;
    }
    if let Some(includes) = matches.get_many::<String>("include") {
        settings.includes = includes.cloned().collect();
    }

    let input = matches
        .get_one::<PathBuf>("INPUT")
        .cloned()
        .unwrap_or_default();
    let output = matches
        .get_one::<PathBuf>("output")
        .cloned()
        .unwrap_or_else(|| input.with_extension("cpp"));

    log::info!("Reading and translating '{}'", input.display());
    let bytes = fs::read(&input)?;
    let bytecode = BytecodeFile::parse(&bytes)?;
    let translation = translate::translate(&settings, &bytecode)?;

    if let Some(corruption) = translation.corruption {
        log::error!(
            "Stopped translating '{}' on corrupt bytecode ({:?}), nothing written",
            input.display(),
            corruption
        );
        return Err(translate::Error::CorruptBytecode(corruption));
    }

    log::info!(
        "Writing {} blocks to '{}'",
        translation.blocks,
        output.display()
    );
    fs::write(&output, translation.source)?;

    Ok(())
}
