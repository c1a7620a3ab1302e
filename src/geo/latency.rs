use std::ops::Range;
use rand::Rng;
use super::region::Region;

// There is no real network between the demo nodes, so the
// latency endpoint draws plausible round trip times for a
// client in the given region talking to its replica versus
// talking to the EU master.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySample {
  pub replica_ms: u32,
  pub master_ms: u32
}

impl LatencySample {
  // How much a reader saves by hitting its own replica.
  pub fn gain(&self) -> u32 {
    self.master_ms.saturating_sub(self.replica_ms)
  }
}

// (replica, master) ranges in milliseconds.
// None stands for a region name we don't know about.
fn latency_ranges(region: Option<Region>) -> (Range<u32>, Range<u32>) {
  match region {
    Some(Region::Eu) => (25..45, 25..45),
    Some(Region::Us) => (40..80, 160..240),
    Some(Region::Asia) => (50..100, 180..270),
    Some(Region::Sa) => (45..90, 170..260),
    Some(Region::Tr) | Some(Region::Africa) => (35..70, 150..230),
    None => (60..120, 120..160)
  }
}

pub fn sample_latency<R: Rng>(region: Option<Region>, rng: &mut R) -> LatencySample {
  let (replica_range, master_range) = latency_ranges(region);
  match region {
    // EU readers hit the master directly, no gain possible.
    Some(Region::Eu) => {
      let base = rng.gen_range(replica_range);
      LatencySample { replica_ms: base, master_ms: base }
    },
    _ => LatencySample {
      replica_ms: rng.gen_range(replica_range),
      master_ms: rng.gen_range(master_range)
    }
  }
}

pub fn latency_report(label: &str, sample: &LatencySample) -> String {
  format!(
    "Latency gain compared to master: {} ms ({}={} ms, Master={} ms)",
    sample.gain(),
    label.to_uppercase(),
    sample.replica_ms,
    sample.master_ms
  )
}
