use std::io::{self, BufRead, BufWriter, Write};

use log::{debug, warn};

use keydex::command::{self, Command};
use keydex::index::{BPTree, ValueRecord, key_from_str};

fn main() {
    env_logger::init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "dataset.db".to_string());

    let mut tree = match BPTree::open(&path) {
        Ok(tree) => tree,
        Err(e) => {
            eprintln!("Failed to open index {}: {}", path, e);
            std::process::exit(1);
        }
    };
    debug!("opened index {}", path);

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        // Query files lead with a record count; the stream itself is
        // authoritative, so bare integers are skipped.
        if line.parse::<u64>().is_ok() {
            continue;
        }

        let cmd = match command::parse(line) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!("{}", e);
                continue;
            }
        };

        match cmd {
            Command::Insert { key, s1, s2, num } => {
                let value = ValueRecord::new(&s1, &s2, num);
                if let Err(e) = tree.insert(&key_from_str(&key), value) {
                    fail(&mut out, e);
                }
            }
            Command::Delete { key, s1, s2, num } => {
                let value = ValueRecord::new(&s1, &s2, num);
                match tree.remove(&key_from_str(&key), value) {
                    Ok(removed) => debug!("delete {}: {}", key, removed),
                    Err(e) => fail(&mut out, e),
                }
            }
            Command::Find { key } => match tree.find(&key_from_str(&key)) {
                Ok(mut values) => {
                    values.sort();
                    if values.is_empty() {
                        writeln!(out, "null").unwrap();
                    } else {
                        for value in &values {
                            writeln!(out, "{}", value).unwrap();
                        }
                    }
                    writeln!(out).unwrap();
                }
                Err(e) => fail(&mut out, e),
            },
        }
    }

    out.flush().unwrap();
}

fn fail<W: Write>(out: &mut W, e: keydex::index::IndexError) -> ! {
    let _ = out.flush();
    eprintln!("Fatal: {}", e);
    std::process::exit(1)
}
