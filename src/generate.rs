//! Seeded benchmark dataset: `user` entities carrying an `id` and a run of random
//! `invite-code` attributes, plus `friendship` relations between random user ids.
//! The same options always produce byte-identical files.

use crate::error::LoadError;
use crate::util::{create_with_backoff, replace_file_atomic_backoff};
use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const CODE_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const CODE_LEN: usize = 8;

pub const SCHEMA_FILE: &str = "schema.tql";
pub const ENTITIES_FILE: &str = "entities.tql";
pub const RELATIONS_FILE: &str = "relations.tql";

const SCHEMA: &str = "define
id sub attribute, value long;
invite-code sub attribute, value string;
user sub entity, owns id @key, owns invite-code, plays friendship:friend;
friendship sub relation, relates friend;
";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    pub entity_count: u64,
    pub relation_count: u64,
    pub attributes_per_entity: usize,
    pub random_seed: u64,
    pub write_buffer_bytes: usize,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            entity_count: 524_288,
            relation_count: 524_288,
            attributes_per_entity: 10,
            random_seed: 0,
            write_buffer_bytes: 256 * 1024,
        }
    }
}

impl GenerationOptions {
    pub fn validate(&self) -> Result<(), LoadError> {
        if self.entity_count == 0 && self.relation_count > 0 {
            return Err(LoadError::config("relations need at least one entity to point at"));
        }
        Ok(())
    }
}

/// Files written by [`generate_dataset`].
#[derive(Clone, Debug)]
pub struct GeneratedDataset {
    pub schema: PathBuf,
    pub entities: PathBuf,
    pub relations: PathBuf,
}

/// Write `schema.tql`, `entities.tql` and `relations.tql` under `dir`.
///
/// Entities are written first and consume the generator before relations do, so
/// changing `relation_count` never changes the entity file.
pub fn generate_dataset(dir: &Path, opts: &GenerationOptions) -> Result<GeneratedDataset> {
    opts.validate()?;
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let mut rng = StdRng::seed_from_u64(opts.random_seed);

    let schema = dir.join(SCHEMA_FILE);
    write_atomic(&schema, opts.write_buffer_bytes, |w| w.write_all(SCHEMA.as_bytes()))?;

    let entities = dir.join(ENTITIES_FILE);
    write_atomic(&entities, opts.write_buffer_bytes, |w| {
        for id in 1..=opts.entity_count {
            write!(w, "insert $e isa user; $e has id {id};")?;
            for _ in 0..opts.attributes_per_entity {
                write!(w, " $e has invite-code \"{}\";", invite_code(&mut rng))?;
            }
            writeln!(w)?;
        }
        Ok(())
    })?;

    let relations = dir.join(RELATIONS_FILE);
    write_atomic(&relations, opts.write_buffer_bytes, |w| {
        for _ in 0..opts.relation_count {
            let a = rng.gen_range(1..=opts.entity_count);
            let b = rng.gen_range(1..=opts.entity_count);
            writeln!(
                w,
                "match $e1 isa user; $e1 has id {a}; $e2 isa user; $e2 has id {b}; insert ($e1, $e2) isa friendship;"
            )?;
        }
        Ok(())
    })?;

    tracing::info!(
        "generated {} entities and {} relations under {} (seed {})",
        opts.entity_count, opts.relation_count, dir.display(), opts.random_seed
    );
    Ok(GeneratedDataset { schema, entities, relations })
}

fn invite_code(rng: &mut StdRng) -> String {
    (0..CODE_LEN).map(|_| CODE_CHARS[rng.gen_range(0..CODE_CHARS.len())] as char).collect()
}

fn write_atomic(
    dest: &Path,
    buf_bytes: usize,
    body: impl FnOnce(&mut BufWriter<fs::File>) -> std::io::Result<()>,
) -> Result<()> {
    let tmp = dest.with_extension("tql.tmp");
    {
        let f = create_with_backoff(&tmp, 20, 50).with_context(|| format!("create {}", tmp.display()))?;
        let mut w = BufWriter::with_capacity(buf_bytes.max(8 * 1024), f);
        body(&mut w).with_context(|| format!("writing {}", tmp.display()))?;
        w.flush()?;
    }
    replace_file_atomic_backoff(&tmp, dest)
}
