//! Input line source and input file discovery.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, IsTerminal, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::info;

/// Lines of a byte stream, decoded lossily and without line terminators.
///
/// Invalid UTF-8 never fails the stream; only I/O errors do.
pub struct LossyLines<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: BufRead> Iterator for LossyLines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                let line = self.buf.strip_suffix(b"\n").unwrap_or(&self.buf);
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                Some(Ok(String::from_utf8_lossy(line).into_owned()))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

pub fn read_lines<R: BufRead>(reader: R) -> LossyLines<R> {
    LossyLines {
        reader,
        buf: Vec::new(),
    }
}

pub fn open_input(path: &Path) -> anyhow::Result<LossyLines<BufReader<File>>> {
    let file = File::open(path).with_context(|| format!("Failed to open input file {:?}", path))?;
    info!(action = "open", component = "input", file_path = ?path, "Opened input file");
    Ok(read_lines(BufReader::new(file)))
}

/// `*.txt` files directly inside `dir`, sorted by name.
pub fn discover_inputs(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut found: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to list directory {:?}", dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"))
        })
        .collect();
    found.sort();
    Ok(found)
}

/// Pick an input file from `dir`, asking on the terminal when there is a choice.
pub fn choose_input(dir: &Path) -> anyhow::Result<PathBuf> {
    let candidates = discover_inputs(dir)?;
    let Some(first) = candidates.first() else {
        anyhow::bail!("No .txt files found in {:?}. Use --input to name one.", dir);
    };

    if candidates.len() == 1 || !io::stdin().is_terminal() {
        println!("Using input file: {}", first.display());
        return Ok(first.clone());
    }

    println!("\nText files found in {}:\n", dir.display());
    for (idx, path) in candidates.iter().enumerate() {
        let size_kb = fs::metadata(path).map(|m| m.len() as f64 / 1024.0).unwrap_or(0.0);
        let name = path.file_name().unwrap_or_default().to_string_lossy();
        println!("{}) {} ({:.1} KB)", idx + 1, name, size_kb);
    }
    print!("\nChoose the file to process [1]: ");
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    let chosen = pick_candidate(&candidates, &answer);
    println!("Selected: {}\n", chosen.display());
    Ok(chosen.clone())
}

/// Resolve a typed answer to a candidate; anything invalid selects the first.
fn pick_candidate<'a>(candidates: &'a [PathBuf], answer: &str) -> &'a PathBuf {
    answer
        .trim()
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|idx| candidates.get(idx))
        .unwrap_or(&candidates[0])
}
