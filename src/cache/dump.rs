//! Line-oriented cache dump format.
//!
//! One record per line:
//! `namespace.name,configId,generation,contentHash,payload,schemaHash,internalRedeploy`
//! where `payload` is standard base64 and `internalRedeploy` is `true` or
//! `false`. A record without the trailing flag loads with the flag cleared.
//! The short forms `namespace.name,configId,generation,contentHash[,payload]`
//! are accepted on load with an empty schema hash; in those forms the config
//! id must not contain commas.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use crate::model::{CacheKey, RawConfig};

#[derive(Debug, thiserror::Error)]
pub enum DumpError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error("line {line}: content hash {recorded} does not match payload (computed {computed})")]
    HashMismatch {
        line: usize,
        recorded: String,
        computed: String,
    },
}

/// Render one cache entry as a dump record.
pub fn encode_record(config: &RawConfig) -> String {
    let key = config.key();
    format!(
        "{},{},{},{},{},{},{}",
        key.qualified_name(),
        key.config_id,
        config.generation(),
        config.content_hash(),
        STANDARD.encode(config.payload()),
        key.schema_hash,
        config.is_internal_redeploy()
    )
}

/// Parse one dump record. `line` is only used for error messages.
pub fn parse_record(record: &str, line: usize) -> Result<RawConfig, DumpError> {
    let malformed = |reason: String| DumpError::Malformed { line, reason };

    let fields: Vec<&str> = record.split(',').collect();
    // Schema hashes are hex, so a trailing `true`/`false` is always the flag.
    let (fields, internal_redeploy) = match fields.split_last() {
        Some((&flag, rest)) if rest.len() >= 6 && matches!(flag, "true" | "false") => {
            (rest, flag == "true")
        }
        _ => (fields.as_slice(), false),
    };
    let (qualified, config_id, generation, recorded_hash, payload, schema_hash) =
        match fields.len() {
            4 => (fields[0], fields[1].to_string(), fields[2], fields[3], "", ""),
            5 => (fields[0], fields[1].to_string(), fields[2], fields[3], fields[4], ""),
            n if n >= 6 => (
                fields[0],
                fields[1..n - 4].join(","),
                fields[n - 4],
                fields[n - 3],
                fields[n - 2],
                fields[n - 1],
            ),
            n => return Err(malformed(format!("expected at least 4 fields, found {n}"))),
        };

    let (namespace, name) = qualified
        .rsplit_once('.')
        .ok_or_else(|| malformed(format!("'{qualified}' is not namespace.name")))?;
    let generation: i64 = generation
        .parse()
        .map_err(|e| malformed(format!("bad generation '{generation}': {e}")))?;
    let payload = STANDARD
        .decode(payload)
        .map_err(|e| malformed(format!("bad payload encoding: {e}")))?;

    let key = CacheKey::new(namespace, name, config_id, schema_hash);
    let config = RawConfig::new(key, payload, generation, internal_redeploy);
    if config.content_hash() != recorded_hash {
        return Err(DumpError::HashMismatch {
            line,
            recorded: recorded_hash.to_string(),
            computed: config.content_hash().to_string(),
        });
    }
    Ok(config)
}

/// Write `configs` to `path`, sorted for stable output.
pub fn write_dump(path: &Path, configs: &[Arc<RawConfig>]) -> Result<(), DumpError> {
    let mut records: Vec<String> = configs.iter().map(|c| encode_record(c)).collect();
    records.sort();

    let mut writer = BufWriter::new(File::create(path)?);
    for record in records {
        writeln!(writer, "{record}")?;
    }
    writer.flush()?;
    Ok(())
}

/// Read every record from a dump file. Blank lines are skipped.
pub fn read_dump(path: &Path) -> Result<Vec<RawConfig>, DumpError> {
    let reader = BufReader::new(File::open(path)?);
    let mut configs = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        configs.push(parse_record(trimmed, index + 1)?);
    }
    Ok(configs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn sample() -> Vec<Arc<RawConfig>> {
        vec![
            Arc::new(RawConfig::new(
                CacheKey::new("cloud.config", "sentinel", "hosts/node1", "ab12"),
                "line one\nline two, with comma",
                4,
                false,
            )),
            Arc::new(RawConfig::new(
                CacheKey::new("document.config", "documentmanager", "search/cluster,odd", ""),
                "",
                9,
                false,
            )),
        ]
    }

    fn triples(configs: impl IntoIterator<Item = RawConfig>) -> BTreeSet<(CacheKey, i64, String)> {
        configs
            .into_iter()
            .map(|c| (c.key().clone(), c.generation(), c.content_hash().to_string()))
            .collect()
    }

    #[test]
    fn dump_then_read_keeps_key_generation_and_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.dump");
        let configs = sample();

        write_dump(&path, &configs).unwrap();
        let loaded = read_dump(&path).unwrap();

        let expected = triples(configs.iter().map(|c| (**c).clone()));
        assert_eq!(triples(loaded), expected);
    }

    #[test]
    fn internal_redeploy_survives_dump() {
        let config = RawConfig::new(
            CacheKey::new("cloud.config", "sentinel", "hosts/node1,b", "ab12"),
            "payload",
            6,
            true,
        );
        let record = encode_record(&config);
        assert!(record.ends_with(",ab12,true"));

        let loaded = parse_record(&record, 1).unwrap();
        assert!(loaded.is_internal_redeploy());
        assert_eq!(loaded.key().config_id, "hosts/node1,b");
        assert_eq!(loaded, config);
    }

    #[test]
    fn record_without_flag_loads_cleared() {
        let config = RawConfig::new(CacheKey::new("ns", "cfg", "a,b", "ab12"), "x", 2, false);
        let legacy = encode_record(&config).trim_end_matches(",false").to_string();
        let loaded = parse_record(&legacy, 1).unwrap();
        assert!(!loaded.is_internal_redeploy());
        assert_eq!(loaded.key(), config.key());
    }

    #[test]
    fn records_stay_on_one_line() {
        let record = encode_record(&sample()[0]);
        assert!(!record.contains('\n'));
    }

    #[test]
    fn short_form_without_payload() {
        let config = RawConfig::new(CacheKey::new("ns", "cfg", "id", ""), "", 2, false);
        let record = format!("ns.cfg,id,2,{}", config.content_hash());
        assert_eq!(parse_record(&record, 1).unwrap(), config);
    }

    #[test]
    fn rejects_tampered_hash() {
        let config = sample().remove(0);
        let tampered =
            encode_record(&config).replace(config.content_hash(), &"0".repeat(64));
        assert!(matches!(
            parse_record(&tampered, 3),
            Err(DumpError::HashMismatch { line: 3, .. })
        ));
    }

    #[test]
    fn rejects_malformed_records() {
        assert!(matches!(
            parse_record("nodot,id,1", 1),
            Err(DumpError::Malformed { .. })
        ));
        assert!(matches!(
            parse_record("nodot,id,1,abc", 1),
            Err(DumpError::Malformed { .. })
        ));
        assert!(matches!(
            parse_record("ns.cfg,id,notanumber,abc", 1),
            Err(DumpError::Malformed { .. })
        ));
    }
}
