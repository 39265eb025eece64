//! Process memory and system load sampling
//!
//! Read from `/proc` on Linux; other platforms report zeros.

/// Peak resident set size of this process in MB
pub fn memory_usage_mb() -> f64 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(text) = std::fs::read_to_string("/proc/self/status") {
            let kb = status_field_kb(&text, "VmHWM").or_else(|| status_field_kb(&text, "VmRSS"));
            if let Some(kb) = kb {
                return kb as f64 / 1024.0;
            }
        }
    }
    0.0
}

/// 1, 5 and 15 minute load averages
pub fn load_average() -> [f64; 3] {
    #[cfg(target_os = "linux")]
    {
        if let Ok(text) = std::fs::read_to_string("/proc/loadavg") {
            if let Some(load) = parse_loadavg(&text) {
                return load;
            }
        }
    }
    [0.0; 3]
}

/// Value of a `Key:   1234 kB` line
fn status_field_kb(text: &str, key: &str) -> Option<u64> {
    text.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim() == key)
        .and_then(|(_, value)| value.split_whitespace().next())
        .and_then(|n| n.parse().ok())
}

fn parse_loadavg(text: &str) -> Option<[f64; 3]> {
    let mut fields = text.split_whitespace().map(|f| f.parse::<f64>());
    let one = fields.next()?.ok()?;
    let five = fields.next()?.ok()?;
    let fifteen = fields.next()?.ok()?;
    Some([one, five, fifteen])
}
