// Copyright 2015-2020 Parity Technologies (UK) Ltd.
// This file is part of ethash-tools.

// ethash-tools is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// ethash-tools is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with ethash-tools.  If not, see <http://www.gnu.org/licenses/>.

//! Offline CLI for pre-warming ethash cache/dataset files onto disk, ahead
//! of a node actually reaching the epoch that needs them.

use std::path::PathBuf;
use std::process;

use clap::{App, Arg, SubCommand};

fn main() {
    env_logger::init();

    let matches = App::new("ethash-tools")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Generates ethash verification caches and mining datasets ahead of time")
        .subcommand(
            SubCommand::with_name("makecache")
                .about("Generates the verification cache for a block number's epoch")
                .arg(Arg::with_name("block").required(true).help("block number"))
                .arg(Arg::with_name("dir").required(true).help("output directory")),
        )
        .subcommand(
            SubCommand::with_name("makedag")
                .about("Generates the mining dataset for a block number's epoch")
                .arg(Arg::with_name("block").required(true).help("block number"))
                .arg(Arg::with_name("dir").required(true).help("output directory")),
        )
        .get_matches();

    let result = match matches.subcommand() {
        ("makecache", Some(sub)) => run(sub, ethash::make_cache),
        ("makedag", Some(sub)) => run(sub, ethash::make_dataset),
        _ => {
            eprintln!("{}", matches.usage());
            process::exit(2);
        }
    };

    if let Err(e) = result {
        eprintln!("{e}");
        process::exit(2);
    }
}

fn run(sub: &clap::ArgMatches, generate: impl FnOnce(u64, &std::path::Path)) -> ethash::Result<()> {
    let block: u64 = sub
        .value_of("block")
        .unwrap()
        .parse()
        .map_err(|e| ethash::Error::Usage(format!("invalid block number: {e}")))?;
    let dir = PathBuf::from(sub.value_of("dir").unwrap());

    generate(block, &dir);
    Ok(())
}
