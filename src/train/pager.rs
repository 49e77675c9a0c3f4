//! Disk-paged score buffer.
//!
//! The cumulative score of every scanned window in the training
//! population lives here; the population is usually far too large for
//! memory. Pages are raw little-endian `f32` arrays in files named
//! `prefix%03d.dat`, visited strictly sequentially — the access pattern
//! every training round is one full update or read pass. The caller must
//! guarantee exclusive single-process access to the prefix; a pass
//! aborted mid-write leaves the buffer invalid.

use crate::errors::Result;

use std::fs;
use std::path::PathBuf;

pub struct ScorePager {
    prefix: PathBuf,
    page_size: usize,
    total: usize,
    buf: Vec<f32>,
}

impl ScorePager {
    /// Create a zero-filled buffer for `total` scores.
    pub fn create(prefix: impl Into<PathBuf>, page_size: usize, total: usize) -> Result<Self> {
        assert!(page_size > 0, "zero page size");
        let mut pager = Self {
            prefix: prefix.into(),
            page_size,
            total,
            buf: vec![0.0; page_size],
        };
        for page in 0..pager.n_pages() {
            pager.buf.iter_mut().for_each(|s| *s = 0.0);
            pager.write_page(page)?;
        }
        Ok(pager)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    fn n_pages(&self) -> usize {
        self.total.div_ceil(self.page_size)
    }

    fn page_path(&self, page: usize) -> PathBuf {
        let mut name = self.prefix.as_os_str().to_os_string();
        name.push(format!("{page:03}.dat"));
        PathBuf::from(name)
    }

    fn page_len(&self, page: usize) -> usize {
        (self.total - page * self.page_size).min(self.page_size)
    }

    fn read_page(&mut self, page: usize) -> Result<()> {
        let bytes = fs::read(self.page_path(page))?;
        let len = self.page_len(page);
        assert!(bytes.len() >= len * 4, "short score page {page}");
        for (slot, chunk) in self.buf[..len].iter_mut().zip(bytes.chunks_exact(4)) {
            *slot = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(())
    }

    fn write_page(&self, page: usize) -> Result<()> {
        let len = self.page_len(page);
        let mut bytes = Vec::with_capacity(len * 4);
        for score in &self.buf[..len] {
            bytes.extend_from_slice(&score.to_le_bytes());
        }
        fs::write(self.page_path(page), bytes)?;
        Ok(())
    }

    /// Stream every score through `f(index, old) -> new`, rewriting each
    /// page as it completes.
    pub fn update_pass<F>(&mut self, mut f: F) -> Result<()>
        where F: FnMut(usize, f32) -> f32,
    {
        for page in 0..self.n_pages() {
            self.read_page(page)?;
            let base = page * self.page_size;
            let len = self.page_len(page);
            for (offset, slot) in self.buf[..len].iter_mut().enumerate() {
                *slot = f(base + offset, *slot);
            }
            self.write_page(page)?;
        }
        Ok(())
    }

    /// Stream every score through `f(index, score)` without writing.
    pub fn read_pass<F>(&mut self, mut f: F) -> Result<()>
        where F: FnMut(usize, f32),
    {
        for page in 0..self.n_pages() {
            self.read_page(page)?;
            let base = page * self.page_size;
            let len = self.page_len(page);
            for (offset, slot) in self.buf[..len].iter().enumerate() {
                f(base + offset, *slot);
            }
        }
        Ok(())
    }

    /// Delete the page files. Called when a run completes; an aborted
    /// run leaves them behind for inspection.
    pub fn remove_files(self) -> Result<()> {
        for page in 0..self.n_pages() {
            fs::remove_file(self.page_path(page))?;
        }
        Ok(())
    }
}
