//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// occ - C compiler front-end driver
//

use clap::Parser;
use occ::Compiler;
use std::io::{Read, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about = "occ - compile C to textual IR")]
struct Args {
    /// Output file (default: standard output)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// C source file ("-" reads standard input)
    input: String,
}

fn read_input(input: &str) -> std::io::Result<String> {
    if input == "-" {
        let mut src = String::new();
        std::io::stdin().read_to_string(&mut src)?;
        Ok(src)
    } else {
        std::fs::read_to_string(input)
    }
}

fn main() {
    let args = Args::parse();

    let src = match read_input(&args.input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("occ: {}: {}", args.input, e);
            std::process::exit(1);
        }
    };

    let file = if args.input == "-" {
        "<stdin>".to_string()
    } else {
        args.input.clone()
    };
    let ir = Compiler::new(file, &src).and_then(Compiler::compile);
    let ir = match ir {
        Ok(text) => text,
        Err(e) => {
            eprintln!("{}:{}", args.input, e);
            std::process::exit(1);
        }
    };

    let res = match &args.output {
        Some(path) => std::fs::write(path, ir),
        None => std::io::stdout().write_all(ir.as_bytes()),
    };
    if let Err(e) = res {
        eprintln!("occ: {}", e);
        std::process::exit(1);
    }
}
