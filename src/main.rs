use log::debug;
use romfields::loader;
use romfields::settings::SETTINGS_FILE;
use romfields::{Category, EditSession, EditorSettings, Image, RecordId, RecordRegistry};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn usage(program: &str) {
    println!("romfields - schema-driven field editor for NES cartridge images");
    println!();
    println!("Usage:");
    println!("  {} info <rom>", program);
    println!("  {} list <schema>", program);
    println!("  {} dump <rom> <schema> [CATEGORY]", program);
    println!("  {} verify <rom> <schema>", program);
    println!("  {} set <rom> <schema> <CATEGORY_index> <field> <value> [out]", program);
    println!();
    println!("Settings are read from {} in the working directory.", SETTINGS_FILE);
}

/// Print a readable message for files that cannot be opened and exit.
fn require_file(path: &str, what: &str) -> PathBuf {
    let path = PathBuf::from(path);
    if let Err(e) = std::fs::metadata(&path) {
        match e.kind() {
            std::io::ErrorKind::NotFound => {
                eprintln!("Error: {} not found: {}", what, path.display());
                eprintln!();
                eprintln!("Please check:");
                eprintln!("• File path is correct");
                eprintln!("• You're running from the right directory");
            }
            std::io::ErrorKind::PermissionDenied => {
                eprintln!("Error: Permission denied accessing {}: {}", what, path.display());
            }
            _ => eprintln!("Error: Cannot open {} '{}': {}", what, path.display(), e),
        }
        std::process::exit(1);
    }
    path
}

fn open_session(rom: &str, schema: &str, settings: EditorSettings) -> Result<EditSession, Box<dyn std::error::Error>> {
    let rom = require_file(rom, "ROM file");
    let schema = require_file(schema, "schema file");
    let registry = Arc::new(loader::load_file(&schema)?);
    Ok(EditSession::open(&rom, registry, settings)?)
}

fn dump(session: &EditSession, filter: Option<Category>) -> Result<(), Box<dyn std::error::Error>> {
    for category in session.list_categories() {
        if filter.is_some_and(|c| c != category) {
            continue;
        }
        println!("***** {} *****", category);
        for record in session.list_records(category) {
            match record.alias_of {
                Some(target) => println!("[{}] {} (shares code with {})", record.id, record.display_name(), target),
                None => println!("[{}] {}", record.id, record.display_name()),
            }
            for view in session.get_field_values(record.id)? {
                let shown = match &view.value {
                    Ok(value) => value.display_as(view.field.tag),
                    Err(e) => format!("<{}>", e),
                };
                let addresses: Vec<String> = view.addresses.iter().map(|a| format!("{:#06x}", a)).collect();
                println!(
                    "  {:>4} {:<28} {:<9} {} @ {}",
                    view.field.id,
                    view.field.label,
                    view.field.tag.name(),
                    shown,
                    addresses.join(",")
                );
            }
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        usage(&args[0]);
        return Ok(());
    }

    let settings = EditorSettings::load(Path::new(SETTINGS_FILE))?;
    debug!("Settings: {:?}", settings);

    match (args[1].as_str(), args.len()) {
        ("info", 3) => {
            let rom = require_file(&args[2], "ROM file");
            let image = Image::load(&rom, settings.address_mode)?;
            match image.header() {
                Some(header) => print!("{}", header),
                None => println!("{} bytes, flat addressing", image.len()),
            }
        }
        ("list", 3) => {
            let schema = require_file(&args[2], "schema file");
            let registry: RecordRegistry = loader::load_file(&schema)?;
            print!("{}", registry);
        }
        ("dump", 4) | ("dump", 5) => {
            let filter = match args.get(4) {
                Some(name) => Some(
                    Category::from_prefix(name).ok_or_else(|| format!("Unknown category: {}", name))?,
                ),
                None => None,
            };
            let session = open_session(&args[2], &args[3], settings)?;
            dump(&session, filter)?;
        }
        ("verify", 4) => {
            let session = open_session(&args[2], &args[3], settings)?;
            let violations = session.validate_all();
            if violations.is_empty() {
                println!("No violations.");
            } else {
                for v in &violations {
                    println!("{}", v);
                }
                println!("{} violation(s)", violations.len());
                std::process::exit(1);
            }
        }
        ("set", 7) | ("set", 8) => {
            let session = open_session(&args[2], &args[3], settings)?;
            let id: RecordId = args[4].parse()?;
            session.set_field_text(id, &args[5], &args[6])?;
            let out = args.get(7).map(PathBuf::from).unwrap_or_else(|| PathBuf::from(&args[2]));
            session.save(&out)?;
            let binding = session.binding(id, &args[5])?;
            println!(
                "{}.{} = {}",
                id,
                args[5],
                binding.decoded_value.display_as(binding.field.tag)
            );
        }
        _ => usage(&args[0]),
    }
    Ok(())
}
