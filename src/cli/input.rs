use std::fs;
use std::io::{self, BufRead};
use std::path::Path;

use anyhow::{Context, Result};

pub fn read_file(path: &Path) -> Result<String> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read input file {}", path.display()))?;
    Ok(text.trim().to_string())
}

/// Read lines until end of input and join them with single spaces.
pub fn read_lines<R: BufRead>(reader: R) -> io::Result<String> {
    let mut text = String::new();
    for line in reader.lines() {
        text.push_str(&line?);
        text.push(' ');
    }
    Ok(text.trim().to_string())
}
