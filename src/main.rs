//! Command-line interface for xsdcodec

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};

#[cfg(feature = "cli")]
use std::fs;
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
use xsdcodec::validators::XsdType;
#[cfg(feature = "cli")]
use xsdcodec::{
    Document, EncodeOptions, PrefixTable, SchemaBuilder, Value, WriteOptions, XsdSchema,
};

#[cfg(feature = "cli")]
#[derive(Parser, Debug)]
#[command(name = "xsdcodec")]
#[command(author, version, about = "Schema-driven JSON to XML encoding and validation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Subcommand, Debug)]
enum Commands {
    /// Encode a JSON value into an XML document
    Encode {
        /// Path to the main XSD schema file
        #[arg(short, long, value_name = "SCHEMA")]
        schema: PathBuf,

        /// Imported schema as NAMESPACE=PATH (repeatable)
        #[arg(long, value_name = "NS=PATH")]
        import: Vec<String>,

        /// Path to the JSON value to encode
        #[arg(long, value_name = "FILE")]
        input: PathBuf,

        /// Prefix bound to the target namespace
        #[arg(long)]
        target_alias: Option<String>,

        /// Extra prefix binding as PREFIX=URI (repeatable)
        #[arg(long, value_name = "PREFIX=URI")]
        ns: Vec<String>,

        /// Name of the root element
        #[arg(long)]
        root: Option<String>,

        /// Match keys to particles by name instead of by position
        #[arg(long)]
        unordered: bool,

        /// Validate the produced document before writing it
        #[arg(long)]
        strict: bool,

        /// Indent the output by this many spaces
        #[arg(long)]
        indent: Option<usize>,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate an XML document against an XSD schema
    Validate {
        /// Path to the main XSD schema file
        #[arg(short, long, value_name = "SCHEMA")]
        schema: PathBuf,

        /// Imported schema as NAMESPACE=PATH (repeatable)
        #[arg(long, value_name = "NS=PATH")]
        import: Vec<String>,

        /// Path to the XML file to validate
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output violations as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Inspect a schema and list its global components
    Inspect {
        /// Path to the main XSD schema file
        #[arg(short, long, value_name = "SCHEMA")]
        schema: PathBuf,

        /// Imported schema as NAMESPACE=PATH (repeatable)
        #[arg(long, value_name = "NS=PATH")]
        import: Vec<String>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

#[cfg(feature = "cli")]
fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Encode {
            schema,
            import,
            input,
            target_alias,
            ns,
            root,
            unordered,
            strict,
            indent,
            output,
        } => {
            let options = EncodeOptions::new()
                .with_allow_unordered(unordered)
                .with_strict_validation(strict);
            let options = match root {
                Some(root) => options.with_root(root),
                None => options,
            };
            cmd_encode(schema, import, input, target_alias, ns, options, indent, output)
        }
        Commands::Validate {
            schema,
            import,
            file,
            json,
        } => cmd_validate(schema, import, file, json),
        Commands::Inspect {
            schema,
            import,
            json,
        } => cmd_inspect(schema, import, json),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(feature = "cli")]
type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Split a `KEY=VALUE` argument
#[cfg(feature = "cli")]
fn split_pair(arg: &str) -> CliResult<(&str, &str)> {
    arg.split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", arg).into())
}

#[cfg(feature = "cli")]
fn load_schema(schema: PathBuf, imports: &[String]) -> CliResult<XsdSchema> {
    let mut builder = SchemaBuilder::new().load_file(&schema)?;
    for import in imports {
        let (namespace, path) = split_pair(import)?;
        builder = builder.import_file(namespace, path)?;
    }
    Ok(builder.build()?)
}

#[cfg(feature = "cli")]
#[allow(clippy::too_many_arguments)]
fn cmd_encode(
    schema: PathBuf,
    imports: Vec<String>,
    file: PathBuf,
    alias: Option<String>,
    prefixes: Vec<String>,
    options: EncodeOptions,
    indent: Option<usize>,
    output: Option<PathBuf>,
) -> CliResult<()> {
    let schema = load_schema(schema, &imports)?;
    let bindings = prefixes
        .iter()
        .map(|arg| split_pair(arg))
        .collect::<CliResult<Vec<_>>>()?;
    let table = PrefixTable::resolve(&schema, alias.as_deref(), bindings)?;

    let value = Value::from_json_str(&fs::read_to_string(&file)?)?;
    let doc = schema.encode(&value, &table, &options)?;

    let mut write_options = WriteOptions::new();
    if let Some(indent) = indent {
        write_options = write_options.with_indent(indent);
    }
    let xml = doc.to_xml_string(&write_options)?;

    match output {
        Some(path) => fs::write(path, xml)?,
        None => println!("{}", xml),
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn cmd_validate(schema: PathBuf, imports: Vec<String>, file: PathBuf, json: bool) -> CliResult<()> {
    let schema = load_schema(schema, &imports)?;
    let doc = Document::from_str(&fs::read_to_string(&file)?)?;
    let report = schema.validation_report(&doc);

    if json {
        println!("{}", serde_json::to_string_pretty(&report.violations)?);
    } else if report.is_valid() {
        println!("✓ Document is valid");
    } else {
        println!("✗ Document is invalid");
        println!();
        println!("Errors:");
        for violation in report.iter() {
            println!("  - {}", violation);
        }
    }

    if !report.is_valid() {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn cmd_inspect(schema: PathBuf, imports: Vec<String>, json: bool) -> CliResult<()> {
    let schema = load_schema(schema, &imports)?;
    let globals = schema.globals();

    if json {
        let elements: Vec<_> = schema
            .elements()
            .map(|elem| {
                serde_json::json!({
                    "name": elem.name.to_string(),
                    "type": globals.type_name(&elem.type_ref),
                    "abstract": elem.is_abstract,
                    "nillable": elem.nillable,
                })
            })
            .collect();
        let output = serde_json::json!({
            "targetNamespace": schema.target_namespace(),
            "namespaces": schema.namespaces(),
            "elements": elements,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("xsdcodec v{}", xsdcodec::VERSION);
    println!();
    println!("Schema Information:");
    match schema.target_namespace() {
        Some(ns) => println!("  Target Namespace: {}", ns),
        None => println!("  Target Namespace: (none)"),
    }
    for namespace in schema.namespaces() {
        println!("  Namespace: {}", namespace.as_deref().unwrap_or("(none)"));
    }

    println!("\n=== Global Elements ===");
    for elem in schema.elements() {
        println!("  {} : {}", elem.name, globals.type_name(&elem.type_ref));
    }

    println!("\n=== Global Types ===");
    for (qname, global_type) in &globals.types {
        if qname.is_xsd() {
            continue;
        }
        let kind = match global_type {
            XsdType::Simple(_) => "simple",
            XsdType::Complex(_) => "complex",
        };
        println!("  {} ({})", qname, kind);
    }
    Ok(())
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Rebuild with --features cli");
    std::process::exit(1);
}
