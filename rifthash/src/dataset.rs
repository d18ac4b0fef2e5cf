/// File-backed full dataset ("DAG") materialization
///
/// The dataset is multi-gigabyte, so it lives in a memory-mapped file and is
/// rebuilt once per epoch. A completed file carries a little-endian magic in
/// its first 8 bytes; the magic is written only after every item, so a crash
/// or abort mid-build never leaves a file the open policy would accept.

use crate::common::hash_types::{Hash256, Node, NODE_BYTES};
use crate::dag::{get_dataset_size, get_seedhash, LightCache, MIX_BYTES, REVISION};
use crate::error::{Result, RifthashError};
use crate::hashimoto::{hashimoto, PowOutput};
use byteorder::{ByteOrder, LittleEndian};
use memmap2::{Mmap, MmapMut};
use rayon::prelude::*;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Magic prefix of a completed DAG file
pub const DAG_MAGIC: u64 = 0xFEE1_DEAD_BADD_CAFE;
/// Bytes the magic occupies on disk
pub const DAG_MAGIC_SIZE: usize = 8;

/// On-disk name of the DAG file for `seed`
pub fn dag_file_name(seed: &Hash256) -> String {
    format!("full-R{}-{}", REVISION, hex::encode(&seed.as_bytes()[..8]))
}

/// Full client handle: the materialized dataset, mapped read-only.
///
/// Compute reads never touch the disk path again, so a handle may be shared
/// across verification threads freely.
pub struct FullDataset {
    file: File,
    file_size: u64,
    map: Mmap,
    path: PathBuf,
}

impl FullDataset {
    /// Open or build the dataset for `light`'s block number under `dirname`.
    ///
    /// The cache is only read during materialization; nothing of `light` is
    /// retained afterwards. `callback` receives a percentage in `[0, 100]`
    /// and aborts the build by returning non-zero.
    pub fn new<F>(dirname: &Path, light: &LightCache, callback: F) -> Result<Self>
    where
        F: FnMut(u32) -> i32,
    {
        Self::with_seed(
            dirname,
            &get_seedhash(light.block_number()),
            get_dataset_size(light.block_number()),
            light,
            callback,
        )
    }

    /// As `new`, with an explicit seed and dataset size
    pub fn with_seed<F>(
        dirname: &Path,
        seed: &Hash256,
        full_size: u64,
        light: &LightCache,
        callback: F,
    ) -> Result<Self>
    where
        F: FnMut(u32) -> i32,
    {
        if full_size == 0 || full_size % MIX_BYTES as u64 != 0 {
            return Err(RifthashError::Invalid(format!(
                "dataset size {} is not a positive multiple of {}",
                full_size, MIX_BYTES
            )));
        }
        fs::create_dir_all(dirname)?;
        let path = dirname.join(dag_file_name(seed));

        if let Some(dataset) = Self::open(&path, full_size)? {
            info!("reusing DAG file {}", path.display());
            return Ok(dataset);
        }
        Self::generate(path, full_size, light, callback)
    }

    /// Map an existing file, if its length and magic both check out.
    fn open(path: &Path, full_size: u64) -> Result<Option<Self>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if file.metadata()?.len() != DAG_MAGIC_SIZE as u64 + full_size {
            return Ok(None);
        }
        let map = unsafe { Mmap::map(&file)? };
        if LittleEndian::read_u64(&map[..DAG_MAGIC_SIZE]) != DAG_MAGIC {
            return Ok(None);
        }
        #[cfg(unix)]
        map.advise(memmap2::Advice::Random)?;
        Ok(Some(Self {
            file,
            file_size: full_size,
            map,
            path: path.to_path_buf(),
        }))
    }

    fn generate<F>(path: PathBuf, full_size: u64, light: &LightCache, callback: F) -> Result<Self>
    where
        F: FnMut(u32) -> i32,
    {
        info!(
            "generating DAG file {} ({} MB)",
            path.display(),
            full_size / (1024 * 1024)
        );
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len(DAG_MAGIC_SIZE as u64 + full_size)?;
        let mut map = unsafe { MmapMut::map_mut(&file)? };
        #[cfg(unix)]
        map.advise(memmap2::Advice::Sequential)?;

        if let Err(e) = compute_full_data(&mut map[DAG_MAGIC_SIZE..], light, callback) {
            drop(map);
            drop(file);
            let _ = fs::remove_file(&path);
            return Err(e);
        }

        // Items first, magic last
        LittleEndian::write_u64(&mut map[..DAG_MAGIC_SIZE], DAG_MAGIC);
        if let Err(e) = map.flush() {
            drop(map);
            drop(file);
            let _ = fs::remove_file(&path);
            return Err(e.into());
        }

        let map = map.make_read_only()?;
        #[cfg(unix)]
        map.advise(memmap2::Advice::Random)?;
        info!("DAG file {} complete", path.display());
        Ok(Self {
            file,
            file_size: full_size,
            map,
            path,
        })
    }

    #[inline]
    fn node(&self, index: u32) -> Node {
        let offset = DAG_MAGIC_SIZE + index as usize * NODE_BYTES;
        Node::from_slice(&self.map[offset..offset + NODE_BYTES])
    }

    /// Hash `header_hash` and `nonce` against the mapped dataset
    pub fn compute(&self, header_hash: &Hash256, nonce: u64) -> PowOutput {
        hashimoto(self.file_size, header_hash, nonce, |index| self.node(index))
    }

    /// Dataset bytes, magic prefix excluded
    pub fn dag(&self) -> &[u8] {
        &self.map[DAG_MAGIC_SIZE..]
    }

    /// Dataset size in bytes, magic prefix excluded
    pub fn size(&self) -> u64 {
        self.file_size
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Length of the backing file on disk, magic prefix included
    pub fn file_len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}

/// Fill `dest` with dataset items derived from `light`.
///
/// `dest.len()` is the dataset size. Items are computed in shards of roughly
/// one percent so the callback sees every step; within a shard, rayon
/// workers each write their own disjoint 64-byte slice. The callback is only
/// ever invoked from the calling thread, with a non-decreasing percentage.
pub fn compute_full_data<F>(dest: &mut [u8], light: &LightCache, mut callback: F) -> Result<()>
where
    F: FnMut(u32) -> i32,
{
    if dest.is_empty() || dest.len() % MIX_BYTES != 0 {
        return Err(RifthashError::Invalid(format!(
            "dataset size {} is not a positive multiple of {}",
            dest.len(),
            MIX_BYTES
        )));
    }
    let total = dest.len() / NODE_BYTES;
    let shard = (total / 100).max(1);

    let mut done = 0usize;
    for chunk in dest.chunks_mut(shard * NODE_BYTES) {
        if callback((done * 100 / total) as u32) != 0 {
            return Err(RifthashError::Aborted);
        }
        let base = done;
        chunk
            .par_chunks_mut(NODE_BYTES)
            .enumerate()
            .for_each(|(i, slot)| {
                let item = light.calc_dataset_item((base + i) as u32);
                slot.copy_from_slice(item.as_bytes());
            });
        done += chunk.len() / NODE_BYTES;
        debug!("dataset items {}/{}", done, total);
    }
    if callback(100) != 0 {
        return Err(RifthashError::Aborted);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;

    const TEST_CACHE_SIZE: u64 = 1024;
    const TEST_FULL_SIZE: u64 = 128 * 61;

    fn test_seed() -> Hash256 {
        Hash256::from_bytes([42u8; 32])
    }

    static TEST_LIGHT: Lazy<LightCache> =
        Lazy::new(|| LightCache::with_seed(TEST_CACHE_SIZE, &test_seed()).unwrap());

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rifthash-{}-{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_dag_file_name_scheme() {
        let mut seed = [0u8; 32];
        seed[..4].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(
            dag_file_name(&Hash256::from_bytes(seed)),
            "full-R23-deadbeef00000000"
        );
    }

    #[test]
    fn test_compute_full_data_is_deterministic() {
        let mut a = vec![0u8; TEST_FULL_SIZE as usize];
        let mut b = vec![0u8; TEST_FULL_SIZE as usize];
        compute_full_data(&mut a, &TEST_LIGHT, |_| 0).unwrap();
        compute_full_data(&mut b, &TEST_LIGHT, |_| 0).unwrap();
        assert_eq!(a, b);
        assert!(a.iter().any(|&byte| byte != 0));
    }

    #[test]
    fn test_compute_full_data_matches_item_derivation() {
        let mut data = vec![0u8; TEST_FULL_SIZE as usize];
        compute_full_data(&mut data, &TEST_LIGHT, |_| 0).unwrap();
        for index in [0usize, 1, 60, 121] {
            let item = TEST_LIGHT.calc_dataset_item(index as u32);
            assert_eq!(
                &data[index * NODE_BYTES..(index + 1) * NODE_BYTES],
                item.as_bytes()
            );
        }
    }

    #[test]
    fn test_compute_full_data_rejects_bad_sizes() {
        assert!(compute_full_data(&mut [], &TEST_LIGHT, |_| 0).is_err());
        assert!(compute_full_data(&mut [0u8; 100], &TEST_LIGHT, |_| 0).is_err());
    }

    #[test]
    fn test_progress_is_monotonic_and_bounded() {
        let mut data = vec![0u8; TEST_FULL_SIZE as usize];
        let mut seen: Vec<u32> = Vec::new();
        compute_full_data(&mut data, &TEST_LIGHT, |percent| {
            seen.push(percent);
            0
        })
        .unwrap();
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*seen.first().unwrap(), 0);
        assert_eq!(*seen.last().unwrap(), 100);
    }

    #[test]
    fn test_light_and_full_agree() {
        let dir = temp_dir("agree");
        let full =
            FullDataset::with_seed(&dir, &test_seed(), TEST_FULL_SIZE, &TEST_LIGHT, |_| 0).unwrap();

        let header = Hash256::from_bytes([0xFF; 32]);
        for nonce in [0u64, 1, 2, 0x5EED] {
            let from_light = TEST_LIGHT.compute_with_size(TEST_FULL_SIZE, &header, nonce);
            let from_full = full.compute(&header, nonce);
            assert!(from_light.success && from_full.success);
            assert_eq!(from_light.result, from_full.result);
            assert_eq!(from_light.mix_hash, from_full.mix_hash);
        }
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_dag_file_round_trip() {
        let dir = temp_dir("roundtrip");
        let built =
            FullDataset::with_seed(&dir, &test_seed(), TEST_FULL_SIZE, &TEST_LIGHT, |_| 0).unwrap();
        assert_eq!(built.size(), TEST_FULL_SIZE);
        assert_eq!(built.file_len().unwrap(), DAG_MAGIC_SIZE as u64 + TEST_FULL_SIZE);
        let body = built.dag().to_vec();
        let path = built.path().to_path_buf();
        drop(built);

        let mut calls = 0u32;
        let reopened = FullDataset::with_seed(&dir, &test_seed(), TEST_FULL_SIZE, &TEST_LIGHT, |_| {
            calls += 1;
            0
        })
        .unwrap();
        assert_eq!(calls, 0, "a valid DAG file must be reused, not rebuilt");
        assert_eq!(reopened.path(), path);
        assert_eq!(reopened.dag(), &body[..]);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_corrupted_dag_diverges_from_light() {
        let dir = temp_dir("corrupt");
        let built =
            FullDataset::with_seed(&dir, &test_seed(), TEST_FULL_SIZE, &TEST_LIGHT, |_| 0).unwrap();
        let path = built.path().to_path_buf();
        drop(built);

        // Flip one byte in every page; length and magic stay valid
        let mut bytes = fs::read(&path).unwrap();
        let mut offset = DAG_MAGIC_SIZE;
        while offset < bytes.len() {
            bytes[offset] ^= 0x01;
            offset += MIX_BYTES;
        }
        fs::write(&path, &bytes).unwrap();

        let corrupted =
            FullDataset::with_seed(&dir, &test_seed(), TEST_FULL_SIZE, &TEST_LIGHT, |_| 0).unwrap();
        let header = Hash256::from_bytes([0xFF; 32]);
        let from_light = TEST_LIGHT.compute_with_size(TEST_FULL_SIZE, &header, 0);
        let from_full = corrupted.compute(&header, 0);
        assert_ne!(from_light.result, from_full.result);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_abort_leaves_no_acceptable_file() {
        let dir = temp_dir("abort");
        let result = FullDataset::with_seed(&dir, &test_seed(), TEST_FULL_SIZE, &TEST_LIGHT, |p| {
            i32::from(p >= 50)
        });
        assert!(matches!(result, Err(RifthashError::Aborted)));
        assert!(!dir.join(dag_file_name(&test_seed())).exists());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_invalid_dataset_size_rejected() {
        let dir = temp_dir("invalid");
        let result = FullDataset::with_seed(&dir, &test_seed(), 100, &TEST_LIGHT, |_| 0);
        assert!(matches!(result, Err(RifthashError::Invalid(_))));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_handles_are_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LightCache>();
        assert_send_sync::<FullDataset>();
    }
}
