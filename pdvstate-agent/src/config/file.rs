//! Parsers for the terminal's local configuration files.

/// Key of the monitoring server entry in the agent config.
pub const SERVER_KEY: &str = "Server";
/// Store number entry in the point-of-sale config.
pub const STORE_ID_KEY: &str = "PDV_NROLOJA";
/// Terminal number entry in the point-of-sale config.
pub const TERMINAL_ID_KEY: &str = "PDV_NROCPU";

/// Value of the first line starting with `Server=`.
///
/// Only the text up to the next `=` is kept. Returns `None` when there is no
/// such line or the value is blank.
pub fn parse_server_address(contents: &str) -> Option<String> {
    let line = contents
        .lines()
        .find_map(|line| line.strip_prefix(SERVER_KEY)?.strip_prefix('='))?;
    let value = line.split('=').next().unwrap_or_default().trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Store and terminal numbers from a `KEY=<digits>` style file.
///
/// Leading whitespace and whitespace around `=` are allowed. When a key
/// appears more than once the last parsable value wins.
pub fn parse_terminal_ids(contents: &str) -> (Option<u32>, Option<u32>) {
    let mut store_id = None;
    let mut terminal_id = None;
    for line in contents.lines() {
        if let Some(id) = numeric_value(line, STORE_ID_KEY) {
            store_id = Some(id);
        }
        if let Some(id) = numeric_value(line, TERMINAL_ID_KEY) {
            terminal_id = Some(id);
        }
    }
    (store_id, terminal_id)
}

fn numeric_value(line: &str, key: &str) -> Option<u32> {
    let rest = line
        .trim_start()
        .strip_prefix(key)?
        .trim_start()
        .strip_prefix('=')?
        .trim_start();
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    rest[..end].parse().ok()
}
