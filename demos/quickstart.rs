use std::io::{self, prelude::*};
use std::path;

use env_logger;
use log;

use ext_line_sort::{ExternalSorter, ExternalSorterBuilder, MemoryBudget};

fn main() {
    env_logger::Builder::new().filter_level(log::LevelFilter::Debug).init();

    let sorter: ExternalSorter = ExternalSorterBuilder::new()
        .with_tmp_dir(path::Path::new("./"))
        .with_memory_budget(MemoryBudget::new(16).unwrap())
        .build()
        .unwrap();

    let input = "banana\napple\ncherry\napple\n";
    let mut output = Vec::new();
    let summary = sorter.sort(io::Cursor::new(input), &mut output).unwrap();

    log::info!("sorted {} records in {} blocks", summary.records, summary.blocks);
    io::stdout().write_all(&output).unwrap();
}
