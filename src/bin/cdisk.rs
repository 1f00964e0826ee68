use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use env_logger::Env;
use log::info;
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use std::process;

use cbmdisk::disk::{Disk, DiskType, FileType};

// Possible exit codes
static _EXIT_SUCCESS: i32 = 0;
static EXIT_FAILURE: i32 = 1;

/// If a dash is specified for a filename, this indicates that the user wants
/// to read from standard input or write to standard output.
static STDINOUT_PSEUDOFILENAME: &str = "-";

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    // Parse command-line arguments
    let app = App::new("Commodore Disk Image Builder")
        .version("0.1.0")
        .about("Build and inspect D64/D71/D81 disk images.")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(Arg::with_name("diskimage").required(true))
        .subcommand(
            SubCommand::with_name("create")
                .about("Create a disk image holding the given files.")
                .arg(
                    Arg::with_name("disk_type")
                        .short("t")
                        .long("disk-type")
                        .takes_value(true)
                        .possible_values(&["d64", "d71", "d81"])
                        .help("Disk image format (default: from the file extension)"),
                )
                .arg(
                    Arg::with_name("file_type")
                        .short("T")
                        .long("file-type")
                        .takes_value(true)
                        .possible_values(&["prg", "seq", "usr"])
                        .default_value("prg")
                        .help("CBM file type for the added files"),
                )
                .arg(
                    Arg::with_name("name")
                        .short("n")
                        .long("name")
                        .takes_value(true)
                        .default_value("")
                        .help("Disk name"),
                )
                .arg(
                    Arg::with_name("id")
                        .short("i")
                        .long("id")
                        .takes_value(true)
                        .default_value("")
                        .help("Disk id"),
                )
                .arg(
                    Arg::with_name("del")
                        .long("del")
                        .takes_value(true)
                        .multiple(true)
                        .number_of_values(1)
                        .help("Add a DEL entry with this name after the files"),
                )
                .arg(
                    Arg::with_name("force")
                        .short("f")
                        .long("force")
                        .help("Overwrite an existing disk image"),
                )
                .arg(Arg::with_name("source_filenames").multiple(true)),
        )
        .subcommand(SubCommand::with_name("dir").about("Show a directory listing"))
        .subcommand(
            SubCommand::with_name("read")
                .about("Read a file from a disk image.")
                .arg(Arg::with_name("source_filename").required(true))
                .arg(Arg::with_name("destination_filename").required(false)),
        )
        .subcommand(
            SubCommand::with_name("bam").about("Show the Block Availability Map (BAM)"),
        )
        .subcommand(SubCommand::with_name("dump").about("Provide a hex dump of a disk image."))
        .subcommand(SubCommand::with_name("validate").about("Validate a disk image."));

    let mut app_clone = app.clone();
    let matches = app.get_matches();

    let diskimage = matches.value_of("diskimage").unwrap();
    let result = match matches.subcommand() {
        ("create", Some(m)) => cmd_create(diskimage, m),
        ("dir", Some(_)) => cmd_dir(diskimage),
        ("read", Some(m)) => cmd_read(
            diskimage,
            m.value_of("source_filename").unwrap(),
            m.value_of("destination_filename"),
        ),
        ("bam", Some(_)) => cmd_bam(diskimage),
        ("dump", Some(_)) => cmd_dump(diskimage),
        ("validate", Some(_)) => cmd_validate(diskimage),
        _ => {
            app_clone.print_help().unwrap();
            println!();
            process::exit(EXIT_FAILURE);
        }
    };
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(EXIT_FAILURE);
    }
}

/// Open a file for reading
fn open_fs_reader(filename: &str) -> io::Result<Box<dyn Read>> {
    if filename == STDINOUT_PSEUDOFILENAME {
        Ok(Box::new(io::stdin()))
    } else {
        Ok(Box::new(fs::File::open(filename)?))
    }
}

/// Open a file for writing
fn open_fs_writer(filename: &str) -> io::Result<Box<dyn Write>> {
    if filename == STDINOUT_PSEUDOFILENAME {
        Ok(Box::new(io::stdout()))
    } else {
        Ok(Box::new(fs::File::create(filename)?))
    }
}

/// Derive a CBM filename from a host path: the final component, upper-cased.
fn cbm_filename(filename: &str) -> Vec<u8> {
    Path::new(filename)
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_uppercase().into_bytes())
        .unwrap_or_default()
}

fn cmd_create(diskimage: &str, m: &ArgMatches) -> io::Result<()> {
    // An explicit type wins; otherwise go by the file extension.
    let disk_type = match m.value_of("disk_type").and_then(DiskType::from_name) {
        Some(disk_type) => disk_type,
        None => match DiskType::from_extension(diskimage) {
            Some(disk_type) => disk_type,
            None => {
                println!("Unknown file extension.  Assuming D64...");
                DiskType::D64
            }
        },
    };
    let file_type = m
        .value_of("file_type")
        .and_then(FileType::from_string)
        .unwrap_or(FileType::PRG);
    let name = m.value_of("name").unwrap_or("");
    let id = m.value_of("id").unwrap_or("");

    let mut disk = Disk::new(disk_type.layout());
    disk.set_name(name.as_bytes(), id.as_bytes())?;
    for source_filename in m.values_of("source_filenames").into_iter().flatten() {
        let mut data = vec![];
        open_fs_reader(source_filename)?.read_to_end(&mut data)?;
        let filename = cbm_filename(source_filename);
        disk.add_typed_file(&filename, &data, file_type)?;
        info!("added {} ({} bytes)", source_filename, data.len());
    }
    for del in m.values_of("del").into_iter().flatten() {
        disk.add_del(del.as_bytes())?;
    }
    disk.save(diskimage, !m.is_present("force"))
}

fn cmd_dir(diskimage: &str) -> io::Result<()> {
    let mut disk = Disk::open(diskimage)?;
    disk.read_bam()?;
    println!("{}", disk);
    for entry in disk.iter() {
        println!("{}", entry);
    }
    println!("{} blocks free.", disk.blocks_free());
    Ok(())
}

fn cmd_read(
    diskimage: &str,
    source_filename: &str,
    destination_filename: Option<&str>,
) -> io::Result<()> {
    let destination_filename = destination_filename.unwrap_or(source_filename);
    let disk = Disk::open(diskimage)?;
    let data = disk.read_file(source_filename.as_bytes())?;
    let mut writer = open_fs_writer(destination_filename)?;
    writer.write_all(&data)?;
    writer.flush()?;
    Ok(())
}

fn cmd_bam(diskimage: &str) -> io::Result<()> {
    let mut disk = Disk::open(diskimage)?;
    disk.read_bam()?;
    println!("{}", disk.bam_map());
    Ok(())
}

fn cmd_dump(diskimage: &str) -> io::Result<()> {
    let disk = Disk::open(diskimage)?;
    disk.dump(&mut io::stdout())?;
    io::stdout().flush()?;
    Ok(())
}

fn cmd_validate(diskimage: &str) -> io::Result<()> {
    let mut disk = Disk::open(diskimage)?;
    disk.read_bam()?;
    let errors = disk.validate()?;
    for e in errors.iter() {
        println!("{}", e);
    }
    if errors.is_empty() {
        println!("Disk validates successfully.");
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::Other,
            format!("{} errors found during validation.", errors.len()),
        ))
    }
}
