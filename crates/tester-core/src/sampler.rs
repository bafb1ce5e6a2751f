//! Averaged, repeated ADC sampling.
//!
//! Every estimator smooths its reads through these helpers. Samples are taken
//! back to back; the only spacing between them is the conversion time of the
//! reader itself.

use crate::test_point::{PathPin, TestPoint, VoltageReader};

/// Mean of N consecutive voltage reads from one node.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SampleAverage {
    /// Arithmetic mean in volts
    pub volts: f32,
    /// Number of reads that went into the mean
    pub count: usize,
}

/// Average `sample_count` reads. A count of zero is taken as one read.
pub fn average<R: VoltageReader + ?Sized>(reader: &mut R, sample_count: usize) -> SampleAverage {
    let count = sample_count.max(1);
    let mut sum = 0.0f32;
    for _ in 0..count {
        sum += reader.read_volts();
    }

    SampleAverage {
        volts: sum / count as f32,
        count,
    }
}

/// Average two nodes with interleaved reads so both means cover the same window.
pub fn average_pair<A, P>(
    x: &mut TestPoint<A, P>,
    y: &mut TestPoint<A, P>,
    sample_count: usize,
) -> (SampleAverage, SampleAverage)
where
    A: VoltageReader,
    P: PathPin,
{
    let count = sample_count.max(1);
    let (mut sum_x, mut sum_y) = (0.0f32, 0.0f32);
    for _ in 0..count {
        sum_x += x.read_voltage();
        sum_y += y.read_voltage();
    }

    (
        SampleAverage {
            volts: sum_x / count as f32,
            count,
        },
        SampleAverage {
            volts: sum_y / count as f32,
            count,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sequence<'a> {
        values: &'a [f32],
        next: usize,
    }

    impl VoltageReader for Sequence<'_> {
        fn read_volts(&mut self) -> f32 {
            let v = self.values[self.next % self.values.len()];
            self.next += 1;
            v
        }
    }

    #[test]
    fn test_average_of_noisy_reads() {
        let mut reader = Sequence {
            values: &[1.0, 1.2, 0.8, 1.0],
            next: 0,
        };
        let avg = average(&mut reader, 4);
        assert_eq!(avg.count, 4);
        approx::assert_relative_eq!(avg.volts, 1.0, epsilon = 1e-6);
        assert_eq!(reader.next, 4);
    }

    #[test]
    fn test_zero_count_reads_once() {
        let mut reader = Sequence {
            values: &[2.5],
            next: 0,
        };
        let avg = average(&mut reader, 0);
        assert_eq!(avg.count, 1);
        assert_eq!(avg.volts, 2.5);
    }
}
