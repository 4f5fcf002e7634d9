use crate::{
    drain, OutOfRangePolicy, Page, RamDisk, RamDiskConfig, Request, RequestError, Segment,
    VecRequestQueue,
};
use proptest::prelude::*;
use proptest::test_runner::TestCaseResult;

#[derive(Debug, Clone)]
enum Op {
    Write { sector: u32, chunks: Vec<Vec<u8>> },
    Read { sector: u32, lens: Vec<u32> },
    PassThrough { opcode: u32 },
}

const SECTOR: u32 = 512;
const MAX_SECTORS: u32 = 64;
const MAX_SEGMENTS: usize = 4;
const MAX_SEGMENT_LEN: usize = 1536;
const MAX_OPS: usize = 48;

fn sector_count_strategy() -> impl Strategy<Value = u32> {
    1u32..=MAX_SECTORS
}

fn sector_strategy(sectors: u32) -> BoxedStrategy<u32> {
    // Mostly in range, with some requests starting at or past the end.
    prop_oneof![
        6 => 0u32..sectors,
        1 => Just(sectors.saturating_sub(1)),
        1 => sectors..=sectors + 2,
    ]
    .boxed()
}

fn op_strategy(sectors: u32) -> BoxedStrategy<Op> {
    let write = (
        sector_strategy(sectors),
        prop::collection::vec(
            prop::collection::vec(any::<u8>(), 0..=MAX_SEGMENT_LEN),
            0..=MAX_SEGMENTS,
        ),
    )
        .prop_map(|(sector, chunks)| Op::Write { sector, chunks });
    let read = (
        sector_strategy(sectors),
        prop::collection::vec(0u32..=MAX_SEGMENT_LEN as u32, 0..=MAX_SEGMENTS),
    )
        .prop_map(|(sector, lens)| Op::Read { sector, lens });

    prop_oneof![
        5 => write,
        4 => read,
        1 => any::<u32>().prop_map(|opcode| Op::PassThrough { opcode }),
    ]
    .boxed()
}

fn scenario_strategy() -> BoxedStrategy<(u32, Vec<Op>)> {
    sector_count_strategy()
        .prop_flat_map(|sectors| {
            (
                Just(sectors),
                prop::collection::vec(op_strategy(sectors), 1..=MAX_OPS),
            )
        })
        .boxed()
}

/// Applies `lens` at `offset` the way the dispatcher should, returning how many leading segments
/// are serviced, or `None` when the whole request is rejected.
fn serviced_segments(
    policy: OutOfRangePolicy,
    offset: usize,
    lens: &[usize],
    capacity: usize,
) -> Option<usize> {
    let total: usize = lens.iter().sum();
    match policy {
        OutOfRangePolicy::Reject => (offset + total <= capacity).then_some(lens.len()),
        OutOfRangePolicy::InRangePrefix => {
            let mut end = offset;
            let mut count = 0;
            for len in lens {
                end += len;
                if end > capacity {
                    break;
                }
                count += 1;
            }
            Some(count)
        }
    }
}

fn run_ops(policy: OutOfRangePolicy, sectors: u32, ops: &[Op]) -> TestCaseResult {
    let disk = RamDisk::new(RamDiskConfig {
        sector_count: sectors,
        out_of_range: policy,
        ..RamDiskConfig::default()
    })
    .unwrap();
    let capacity = disk.capacity_bytes() as usize;
    let mut model = vec![0u8; capacity];

    let mut queue = VecRequestQueue::new();
    let mut expected_results = Vec::new();
    let mut expected_reads: Vec<(Vec<Page>, Vec<Vec<u8>>)> = Vec::new();

    for (tag, op) in ops.iter().enumerate() {
        let tag = tag as u64;
        match op {
            Op::Write { sector, chunks } => {
                let offset = (*sector * SECTOR) as usize;
                let lens: Vec<usize> = chunks.iter().map(Vec::len).collect();
                let serviced = serviced_segments(policy, offset, &lens, capacity);
                let mut pos = offset;
                for chunk in chunks.iter().take(serviced.unwrap_or(0)) {
                    model[pos..pos + chunk.len()].copy_from_slice(chunk);
                    pos += chunk.len();
                }
                expected_results.push(serviced.is_some());

                let segments = chunks
                    .iter()
                    .map(|chunk| Segment::whole(Page::from_vec(chunk.clone())))
                    .collect();
                queue.push(Request::write(tag, u64::from(*sector), segments));
            }
            Op::Read { sector, lens } => {
                let offset = (*sector * SECTOR) as usize;
                let lens_usize: Vec<usize> = lens.iter().map(|len| *len as usize).collect();
                let serviced = serviced_segments(policy, offset, &lens_usize, capacity);
                expected_results.push(serviced.is_some());

                // Unserviced segments keep the page's fill pattern.
                let pages: Vec<Page> = lens
                    .iter()
                    .map(|len| Page::from_vec(vec![0xA5; *len as usize]))
                    .collect();
                let mut expected = Vec::new();
                let mut pos = offset;
                for (idx, len) in lens_usize.iter().enumerate() {
                    if idx < serviced.unwrap_or(0) {
                        expected.push(model[pos..pos + len].to_vec());
                    } else {
                        expected.push(vec![0xA5; *len]);
                    }
                    pos += len;
                }

                let segments = pages.iter().cloned().map(Segment::whole).collect();
                queue.push(Request::read(tag, u64::from(*sector), segments));
                expected_reads.push((pages, expected));
            }
            Op::PassThrough { opcode } => {
                expected_results.push(false);
                queue.push(Request::pass_through(tag, *opcode));
            }
        }
    }

    let stats = drain(&disk, &mut queue);
    prop_assert_eq!(stats.requests() as usize, ops.len());
    prop_assert!(queue.is_empty());

    let completions = queue.take_completions();
    prop_assert_eq!(completions.len(), ops.len());
    for (idx, (completion, ok)) in completions.iter().zip(&expected_results).enumerate() {
        prop_assert_eq!(completion.tag, idx as u64);
        prop_assert_eq!(completion.result.is_ok(), *ok, "op {}: {:?}", idx, &ops[idx]);
        if let (Op::PassThrough { .. }, Err(err)) = (&ops[idx], &completion.result) {
            prop_assert_eq!(err, &RequestError::UnsupportedRequestKind);
        }
    }

    for (pages, expected) in &expected_reads {
        for (page, want) in pages.iter().zip(expected) {
            prop_assert_eq!(&page.to_vec(), want);
        }
    }

    prop_assert_eq!(disk.snapshot(), model);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 32,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_reject_policy_matches_reference((sectors, ops) in scenario_strategy()) {
        run_ops(OutOfRangePolicy::Reject, sectors, &ops)?;
    }

    #[test]
    fn prop_prefix_policy_matches_reference((sectors, ops) in scenario_strategy()) {
        run_ops(OutOfRangePolicy::InRangePrefix, sectors, &ops)?;
    }

    #[test]
    fn prop_in_bounds_write_then_read_round_trips(
        (sectors, sector, data) in sector_count_strategy().prop_flat_map(|sectors| {
            (Just(sectors), 0..sectors).prop_flat_map(move |(sectors, sector)| {
                let room = ((sectors - sector) * SECTOR) as usize;
                (Just(sectors), Just(sector), prop::collection::vec(any::<u8>(), 1..=room.min(4096)))
            })
        })
    ) {
        let disk = RamDisk::new(RamDiskConfig {
            sector_count: sectors,
            ..RamDiskConfig::default()
        })
        .unwrap();

        disk.submit(&Request::write(0, u64::from(sector), vec![Segment::whole(Page::from_vec(data.clone()))]))
            .unwrap();
        let back = Page::with_len(data.len());
        disk.submit(&Request::read(1, u64::from(sector), vec![Segment::whole(back.clone())]))
            .unwrap();
        prop_assert_eq!(back.to_vec(), data);
    }
}
