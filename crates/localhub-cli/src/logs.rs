use std::{
    collections::VecDeque,
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

pub const DEFAULT_TAIL_LINES: usize = 100;

/// Last `count` lines of the log file; empty when the file does not exist yet.
/// Invalid UTF-8 is replaced rather than rejected.
pub fn tail_lines(path: &Path, count: usize) -> io::Result<Vec<String>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };

    let mut recent = VecDeque::with_capacity(count.min(1024));
    for line in BufReader::new(file).split(b'\n') {
        let line = line?;
        if count == 0 {
            continue;
        }
        if recent.len() == count {
            recent.pop_front();
        }
        let text = String::from_utf8_lossy(&line);
        recent.push_back(text.trim_end_matches('\r').to_string());
    }
    Ok(recent.into())
}
