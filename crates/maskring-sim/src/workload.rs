//! Seeded stream of fill jobs with verifiable mask contents.

use crate::digest;
use maskring::{CommandSink, MaskRing, MaskSource, RingError};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// One fill the producer will issue.
///
/// `x` carries the job's sequence number so the executed fill can be matched
/// back to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub seq: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    /// Row stride of `data`; larger than `width` for sub-rectangle masks.
    pub stride: usize,
    pub data: Option<Vec<u8>>,
}

impl Job {
    fn mask(&self) -> Result<Option<MaskSource<'_>>, RingError> {
        self.data
            .as_deref()
            .map(|data| MaskSource::new(data, 0, self.stride, self.width as usize, self.height as usize))
            .transpose()
    }

    /// Digest the executor must report for this job's packed mask.
    pub fn expected_digest(&self) -> Option<u64> {
        let data = self.data.as_deref()?;
        let width = self.width as usize;
        let packed: Vec<u8> = data
            .chunks(self.stride)
            .take(self.height as usize)
            .flat_map(|row| &row[..width])
            .copied()
            .collect();
        Some(digest(&packed))
    }

    /// Issues the job's fill against `ring`.
    pub fn submit<S>(&self, ring: &mut MaskRing, sink: &mut S) -> Result<Option<usize>, RingError>
    where
        S: CommandSink + ?Sized,
    {
        let mask = self.mask()?;
        ring.mask_fill(sink, self.seq, self.y, self.width, self.height, mask.as_ref())
    }
}

/// Generates jobs whose packed masks fit in one region.
#[derive(Debug)]
pub struct Workload {
    rng: SmallRng,
    max_bytes: usize,
    next_seq: i32,
}

impl Workload {
    /// `max_bytes` caps each packed mask; pass the ring's `max_allocation()`.
    pub fn new(seed: u64, max_bytes: usize) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            max_bytes: max_bytes.max(1),
            next_seq: 0,
        }
    }

    pub fn next_job(&mut self) -> Job {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);

        let side = (self.max_bytes as f64).sqrt() as usize;
        let width = self.rng.gen_range(1..=side.max(1));
        let height = self.rng.gen_range(1..=(self.max_bytes / width).max(1));
        let y = self.rng.gen_range(-64..1024);

        // One job in eight has no mask.
        if self.rng.gen_ratio(1, 8) {
            return Job {
                seq,
                y,
                width: width as u32,
                height: height as u32,
                stride: width,
                data: None,
            };
        }

        let stride = width + self.rng.gen_range(0..4);
        let mut data = vec![0u8; stride * height];
        self.rng.fill(&mut data[..]);
        Job {
            seq,
            y,
            width: width as u32,
            height: height as u32,
            stride,
            data: Some(data),
        }
    }
}

impl Iterator for Workload {
    type Item = Job;

    fn next(&mut self) -> Option<Job> {
        Some(self.next_job())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jobs_fit_limit() {
        let workload = Workload::new(7, 1023);
        for job in workload.take(500) {
            assert!((job.width * job.height) as usize <= 1023);
            if let Some(data) = &job.data {
                assert_eq!(data.len(), job.stride * job.height as usize);
                assert!(job.mask().unwrap().is_some());
            }
        }
    }

    #[test]
    fn test_seeded_stream_repeats() {
        let a: Vec<Job> = Workload::new(42, 4000).take(20).collect();
        let b: Vec<Job> = Workload::new(42, 4000).take(20).collect();
        assert_eq!(a, b);
        assert_eq!(a[3].seq, 3);
    }
}
