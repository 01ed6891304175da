/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use anyhow::{Context, Result};
use clap::Parser as clap_parser;
use lancec::TargetKind;
use lancec::errors::CompileError;
use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;

#[derive(clap_parser)]
#[clap(version = "0.1.0", author = "Connor Nolan")]
struct Opts {
    /// Source file; standard input when absent.
    input: Option<PathBuf>,
    /// Output assembly file.
    #[clap(default_value = "output.asm")]
    output: PathBuf,
    /// Target machine to compile for.
    #[clap(short, long, value_enum, default_value_t = TargetKind::Amd64)]
    target: TargetKind,
}

fn main() -> Result<()> {
    let opts: Opts = Opts::parse();

    let source = match &opts.input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file: {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read standard input")?;
            buffer
        }
    };

    let result = lancec::compile(&source, opts.target)?;
    for warning in &result.warnings {
        eprintln!("warning: {}.", warning);
    }

    let mut output = fs::File::create(&opts.output)
        .map_err(|_| CompileError::FopenError(opts.output.display().to_string()))?;
    output
        .write_all(result.assembly.as_bytes())
        .map_err(|_| CompileError::FwriteError)?;

    Ok(())
}
