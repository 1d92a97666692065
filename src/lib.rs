#![cfg_attr(docsrs, feature(doc_cfg))]

/*!
 # Order Batch

 A chunk-oriented batch engine with conditional step flow, and the monthly
 user-level / order-statistics job built on it.

 ## Core Concepts

- **Job:** a named graph of steps and decisions. Each launch gets a fresh run id; a
  failed run can be restarted from its entry step under the same id.
- **Step:** either a **tasklet** run once, or a **chunk-oriented** loop that pages
  through a source, transforms or drops each record, and commits fixed-size chunks.
- **PagingItemSource:** a finite, ordered, filterable and paginated record source.
- **ItemProcessor:** per-record transform returning `Keep(record)` or `Drop`.
- **ItemWriter:** commits a whole chunk at once, or nothing of it.
- **JobExecutionDecider:** maps launch parameters to an outcome label; the job follows
  the edge keyed by `(node, outcome)`, or ends there when no edge matches.

 ## Features

| **Feature**   | **Description**                                                   |
|---------------|-------------------------------------------------------------------|
| csv           | Enables the delimited-text `ItemWriter`                           |
| rdbc-sqlite   | Enables the SQLite paging source, writer and job repository       |
| logger        | Enables a logger `ItemWriter`, useful for debugging purposes      |
| full          | Enables all available features                                    |

 The `order` module and the `order-batch` launcher need both `csv` and `rdbc-sqlite`.

 ## Getting Started

```rust
# use order_batch::{
#     core::{
#         item::{ItemProcessor, ItemProcessorResult, ItemWriter, Processed},
#         job::{Job, JobBuilder},
#         paging::InMemoryPagingSource,
#         parameters::JobParameters,
#         repository::BatchStatus,
#         step::StepBuilder,
#     },
#     BatchError,
# };
# use std::cell::RefCell;
# #[derive(Default)]
# struct VecWriter(RefCell<Vec<u32>>);
# impl ItemWriter<u32> for VecWriter {
#     fn write(&self, items: &[u32]) -> Result<(), BatchError> {
#         self.0.borrow_mut().extend_from_slice(items);
#         Ok(())
#     }
# }
struct LargeAmounts;

impl ItemProcessor<u32, u32> for LargeAmounts {
    fn process(&self, amount: &u32) -> ItemProcessorResult<u32> {
        if *amount >= 200_000 {
            Ok(Processed::Keep(*amount))
        } else {
            Ok(Processed::Drop)
        }
    }
}

fn main() -> Result<(), BatchError> {
    let reader = InMemoryPagingSource::new(vec![1_000, 200_000, 300_000, 500_000]);
    let processor = LargeAmounts;
    let writer = VecWriter::default();

    let step = StepBuilder::new("largeAmounts")
        .chunk::<u32, u32>(2)
        .reader(&reader)
        .processor(&processor)
        .writer(&writer)
        .build()?;

    let job = JobBuilder::new().start(&step).build()?;
    let execution = job.run(&JobParameters::new())?;

    assert_eq!(execution.status, BatchStatus::Completed);
    assert_eq!(writer.0.borrow().as_slice(), &[200_000, 300_000, 500_000]);

    Ok(())
}
```

 ## License
 Licensed under either of

 -   Apache License, Version 2.0
     ([LICENSE-APACHE](LICENSE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0>)
 -   MIT license
     ([LICENSE-MIT](LICENSE-MIT) or <http://opensource.org/licenses/MIT>)

 at your option.
 */

/// Core module for batch operations
pub mod core;

/// Error types for batch operations
pub mod error;

#[doc(inline)]
pub use error::*;

/// Batch settings loaded from TOML and the environment
pub mod config;

/// Set of item sources and writers (for example: SQLite source, CSV writer)
pub mod item;

#[cfg(all(feature = "csv", feature = "rdbc-sqlite"))]
/// The user-level / order-statistics job.
pub mod order;
