//! Configuration file loading: sectioned key/value groups, one section per
//! node class, with sizes and time spans accepted either as raw numbers or
//! human-friendly strings (e.g. `"500 KiB"`, `"5 days"`).

use crate::error::{Result, SimError};
use ini::Ini;
use std::path::Path;

/// The eleven node parameters plus `number`, read from one `[section]` of
/// the configuration file. Field names mirror the node parameters in
/// SPEC_FULL.md §3 so example config files transliterate directly.
#[derive(Debug, Clone)]
pub struct NodeClassConfig {
    pub class_name: String,
    pub number: usize,
    pub n: usize,
    pub k: usize,
    pub data_size: u64,
    pub storage_size: u64,
    pub upload_speed: f64,
    pub download_speed: f64,
    pub average_uptime: f64,
    pub average_downtime: f64,
    pub average_lifetime: f64,
    pub average_recover_time: f64,
    pub arrival_time: f64,
}

/// Parse a byte count: a bare integer, or a human-friendly string such as
/// `"4 KiB"` or `"500MB"`.
pub fn parse_size(raw: &str) -> Result<u64> {
    let raw = raw.trim();
    if let Ok(bytes) = raw.parse::<u64>() {
        return Ok(bytes);
    }
    raw.parse::<bytesize::ByteSize>()
        .map(|size| size.0)
        .map_err(|e| SimError::Config(format!("invalid size `{raw}`: {e}")))
}

/// Parse a time span in seconds: a bare number, or a human-friendly string
/// such as `"5 days"` or `"100 years"`.
pub fn parse_timespan(raw: &str) -> Result<f64> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("inf") || raw.eq_ignore_ascii_case("infinity") {
        return Ok(f64::INFINITY);
    }
    if let Ok(secs) = raw.parse::<f64>() {
        return Ok(secs);
    }
    humantime::parse_duration(raw)
        .map(|d| d.as_secs_f64())
        .map_err(|e| SimError::Config(format!("invalid time span `{raw}`: {e}")))
}

fn required<'a>(
    class_name: &str,
    props: &'a ini::Properties,
    key: &str,
) -> Result<&'a str> {
    props
        .get(key)
        .ok_or_else(|| SimError::Config(format!("[{class_name}] missing required key `{key}`")))
}

/// Load every node class from a configuration file, in section order.
pub fn load_config(path: &Path) -> Result<Vec<NodeClassConfig>> {
    let ini = Ini::load_from_file(path)
        .map_err(|e| SimError::Config(format!("{}: {e}", path.display())))?;

    let mut classes = Vec::new();
    for section_name in ini.sections() {
        let Some(class_name) = section_name else {
            // The implicit top-level section (keys before any `[header]`)
            // isn't a node class.
            continue;
        };
        let props = ini
            .section(Some(class_name))
            .expect("section name came from `ini.sections()`");

        let number: usize = required(class_name, props, "number")?
            .parse()
            .map_err(|_| SimError::Config(format!("[{class_name}] `number` must be an integer")))?;
        let n: usize = required(class_name, props, "n")?
            .parse()
            .map_err(|_| SimError::Config(format!("[{class_name}] `n` must be an integer")))?;
        let k: usize = required(class_name, props, "k")?
            .parse()
            .map_err(|_| SimError::Config(format!("[{class_name}] `k` must be an integer")))?;

        classes.push(NodeClassConfig {
            class_name: class_name.to_string(),
            number,
            n,
            k,
            data_size: parse_size(required(class_name, props, "data_size")?)?,
            storage_size: parse_size(required(class_name, props, "storage_size")?)?,
            upload_speed: parse_size(required(class_name, props, "upload_speed")?)? as f64,
            download_speed: parse_size(required(class_name, props, "download_speed")?)? as f64,
            average_uptime: parse_timespan(required(class_name, props, "average_uptime")?)?,
            average_downtime: parse_timespan(required(class_name, props, "average_downtime")?)?,
            average_lifetime: parse_timespan(required(class_name, props, "average_lifetime")?)?,
            average_recover_time: parse_timespan(required(class_name, props, "average_recover_time")?)?,
            arrival_time: parse_timespan(required(class_name, props, "arrival_time")?)?,
        });
    }

    Ok(classes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_plain_and_human_sizes() {
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size("1 KiB").unwrap(), 1024);
    }

    #[test]
    fn parses_plain_and_human_timespans() {
        assert_eq!(parse_timespan("90").unwrap(), 90.0);
        assert_eq!(parse_timespan("1min").unwrap(), 60.0);
        assert!(parse_timespan("infinity").unwrap().is_infinite());
    }

    #[test]
    fn rejects_garbage_size() {
        assert!(parse_size("not a size").is_err());
    }

    #[test]
    fn loads_sections_in_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[fast]\n\
             number = 2\n\
             n = 4\n\
             k = 2\n\
             data_size = 4 KiB\n\
             storage_size = 12 KiB\n\
             upload_speed = 1 KiB\n\
             download_speed = 1 KiB\n\
             average_uptime = 1 day\n\
             average_downtime = 0\n\
             average_lifetime = infinity\n\
             average_recover_time = 1s\n\
             arrival_time = 0\n\
             \n\
             [slow]\n\
             number = 1\n\
             n = 4\n\
             k = 2\n\
             data_size = 4 KiB\n\
             storage_size = 12 KiB\n\
             upload_speed = 512\n\
             download_speed = 512\n\
             average_uptime = 1 day\n\
             average_downtime = 1 hour\n\
             average_lifetime = 30 days\n\
             average_recover_time = 1 hour\n\
             arrival_time = 60\n"
        )
        .unwrap();

        let classes = load_config(file.path()).unwrap();
        assert_eq!(classes.len(), 2);
        assert_eq!(classes[0].class_name, "fast");
        assert_eq!(classes[0].number, 2);
        assert_eq!(classes[1].class_name, "slow");
        assert_eq!(classes[1].arrival_time, 60.0);
    }
}
