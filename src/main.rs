use std::cmp::Ordering;
use std::path;
use std::process;

use clap::ArgEnum;
use env_logger;
use log;

use ext_line_sort::{ExternalSorterBuilder, MemoryBudget};

/// Gzip level of temporary blocks when compression is on.
const COMPRESSION_LEVEL: u32 = 6;

fn main() {
    let arg_parser = build_arg_parser();

    let log_level: LogLevel = arg_parser.value_of_t_or_exit("log_level");
    init_logger(log_level);

    let order: Order = arg_parser.value_of_t_or_exit("sort");
    let budget: MemoryBudget = arg_parser.value_of_t_or_exit("mem");
    let tmp_dir: Option<&str> = arg_parser.value_of("tmp_dir");
    let threads: Option<usize> = arg_parser
        .is_present("threads")
        .then(|| arg_parser.value_of_t_or_exit("threads"));
    let key_field: Option<usize> = arg_parser
        .is_present("key_field")
        .then(|| arg_parser.value_of_t_or_exit("key_field"));

    let input = path::Path::new(arg_parser.value_of("input").expect("value is required"));
    let output = match arg_parser.value_of("output") {
        Some(output) => path::PathBuf::from(output),
        None => default_output_path(input),
    };

    let mut sorter_builder = ExternalSorterBuilder::new()
        .with_memory_budget(budget)
        .with_strict(arg_parser.is_present("strict"));

    if let Some(threads) = threads {
        sorter_builder = sorter_builder.with_threads_number(threads);
    }

    if let Some(tmp_dir) = tmp_dir {
        sorter_builder = sorter_builder.with_tmp_dir(path::Path::new(tmp_dir));
    }

    if arg_parser.is_present("compress") {
        sorter_builder = sorter_builder.with_compression(COMPRESSION_LEVEL);
    }

    let sorter = match sorter_builder.build() {
        Ok(sorter) => sorter,
        Err(err) => {
            log::error!("sorter initialization error: {}", err);
            process::exit(1);
        }
    };

    let line_order = LineOrder {
        key_field,
        descending: matches!(order, Order::Desc),
    };

    if let Err(err) = sorter.sort_file_by(input, &output, move |a: &[u8], b: &[u8]| line_order.compare(a, b)) {
        log::error!("data sorting error: {}", err);
        process::exit(1);
    }
}

fn default_output_path(input: &path::Path) -> path::PathBuf {
    let file_name = input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    input.with_file_name(format!("out_{}", file_name))
}

/// Line ordering selected on the command line.
#[derive(Copy, Clone)]
struct LineOrder {
    /// 1-based whitespace separated field used as the key, the whole line if not set.
    key_field: Option<usize>,
    descending: bool,
}

impl LineOrder {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        let ordering = match self.key_field {
            Some(field) => line_field(a, field).cmp(line_field(b, field)),
            None => a.cmp(b),
        };

        if self.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

/// Returns the line field with the 1-based index, missing fields are empty.
fn line_field(line: &[u8], field: usize) -> &[u8] {
    line.split(|b| b.is_ascii_whitespace())
        .filter(|f| !f.is_empty())
        .nth(field.saturating_sub(1))
        .unwrap_or(&[])
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as clap::ArgEnum>::from_str(s, false)
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum Order {
    Asc,
    Desc,
}

impl Order {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Order::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for Order {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Order as clap::ArgEnum>::from_str(s, false)
    }
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("ext-line-sort")
        .about("sorts text files larger than memory")
        .arg(
            clap::Arg::new("input")
                .short('i')
                .long("input")
                .help("file to be sorted")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("output")
                .short('o')
                .long("output")
                .help("result file [default: out_<input> next to the input]")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("mem")
                .short('m')
                .long("mem")
                .help("amount of memory to use for sorting (K, M and G suffixes supported)")
                .takes_value(true)
                .default_value("100M")
                .validator(|v| match v.parse::<MemoryBudget>() {
                    Ok(_) => Ok(()),
                    Err(err) => Err(format!("memory size incorrect: {}", err)),
                }),
        )
        .arg(
            clap::Arg::new("sort")
                .short('s')
                .long("sort")
                .help("sorting order")
                .takes_value(true)
                .default_value("asc")
                .possible_values(Order::possible_values()),
        )
        .arg(
            clap::Arg::new("key_field")
                .short('k')
                .long("key-field")
                .help("whitespace separated field (starting from 1) to sort by instead of the whole line")
                .takes_value(true)
                .validator(|v| match v.parse::<usize>() {
                    Ok(field) if field > 0 => Ok(()),
                    _ => Err(format!("key field must be a positive number: {}", v)),
                }),
        )
        .arg(
            clap::Arg::new("compress")
                .short('z')
                .long("compress")
                .help("compress temporary blocks with gzip"),
        )
        .arg(
            clap::Arg::new("strict")
                .long("strict")
                .help("fail on lines longer than the memory budget instead of sorting them in oversized blocks"),
        )
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .default_value("info")
                .possible_values(LogLevel::possible_values()),
        )
        .arg(
            clap::Arg::new("threads")
                .short('t')
                .long("threads")
                .help("number of threads to use for parallel sorting")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("tmp_dir")
                .short('d')
                .long("tmp-dir")
                .help("directory to be used to store temporary data")
                .takes_value(true),
        )
        .get_matches()
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}
