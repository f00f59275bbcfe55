//! The aviary file: persisted canaries between sampling and verification.
//!
//! ```text
//! {"origin":{"keyspace":"shop","table":"orders"},"identifier":{"id":1}}{"origin":...}
//! ```
//!
//! The writer emits a flat concatenation of self-delimiting JSON objects; the
//! reader parses them back one at a time without loading the file.

mod reader;
mod writer;

pub use reader::{AviaryReader, CanaryIter, DEFAULT_CHANNEL_CAPACITY};
pub use writer::AviaryWriter;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Canary, CanarySink, CanarySource, KeyColumn, KeyValue, Origin, TableKeys};
    use crate::error::AviaryError;
    use std::io::Write;
    use std::sync::Arc;

    fn canary(id: i64) -> Canary {
        let origin = Origin::new("shop", "orders");
        let keys = TableKeys::new(
            &origin,
            vec![KeyColumn::partition("id", "bigint"), KeyColumn::clustering("sku", "text")],
        )
        .unwrap();
        Canary::builder(&origin, &keys)
            .field("id", id)
            .field("sku", format!("sku-{id}"))
            .build()
            .unwrap()
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_write_refuses_later_records() {
        let writer = AviaryWriter::create("/dev/full").unwrap();
        let origin = Origin::new("shop", "orders");
        let keys = TableKeys::new(&origin, vec![KeyColumn::partition("id", "text")]).unwrap();
        let oversized = Canary::builder(&origin, &keys)
            .field("id", "x".repeat(64 * 1024))
            .build()
            .unwrap();

        assert!(matches!(writer.write(&oversized), Err(AviaryError::Io(_))));
        assert!(writer.is_broken());
        assert!(matches!(writer.write(&canary(1)), Err(AviaryError::Io(_))));
        assert_eq!(writer.written(), 0);
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aviary.json");

        let writer = AviaryWriter::create(&path).unwrap();
        for id in 0..5 {
            writer.write(&canary(id)).unwrap();
        }
        assert_eq!(writer.finish().unwrap(), 5);

        let read: Vec<Canary> = AviaryReader::new(&path)
            .iter()
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(read, (0..5).map(canary).collect::<Vec<_>>());
    }

    #[test]
    fn test_output_is_unseparated_objects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aviary.json");
        let writer = AviaryWriter::create(&path).unwrap();
        writer.write(&canary(1)).unwrap();
        writer.write(&canary(2)).unwrap();
        writer.finish().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("{\"origin\""));
        assert!(text.contains("}}{\"origin\""));
    }

    #[test]
    fn test_reader_tolerates_comments_and_whitespace() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"// sampled before the repair
{{"origin":{{"keyspace":"ks","table":"t"}},"identifier":{{"id":1}}}}
/* second record */ {{"origin":{{"keyspace":"ks","table":"t"}},"identifier":{{"id":2}}}}
"#
        )
        .unwrap();

        let ids: Vec<_> = AviaryReader::new(file.path())
            .iter()
            .unwrap()
            .map(|c| c.unwrap().get("id").cloned().unwrap())
            .collect();
        assert_eq!(ids, vec![KeyValue::Int(1), KeyValue::Int(2)]);
    }

    #[test]
    fn test_wrong_shape_is_skippable_but_syntax_error_ends_stream() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"unexpected":true}}{{"origin":{{"keyspace":"ks","table":"t"}},"identifier":{{"id":1}}}}{{"origin":"#
        )
        .unwrap();

        let records: Vec<_> = AviaryReader::new(file.path()).iter().unwrap().collect();
        assert_eq!(records.len(), 3);
        assert!(matches!(records[0], Err(AviaryError::Json(_))));
        assert!(records[1].is_ok());
        assert!(records[2].is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = AviaryReader::new("/nonexistent/aviary.json").iter().err().unwrap();
        assert!(matches!(err, AviaryError::Io(_)));
    }

    #[test]
    fn test_concurrent_writes_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aviary.json");
        let writer = Arc::new(AviaryWriter::create(&path).unwrap());

        let threads: Vec<_> = (0..8)
            .map(|t| {
                let writer = writer.clone();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        writer.write(&canary(t * 1000 + i)).unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        let writer = Arc::try_unwrap(writer).unwrap();
        assert_eq!(writer.finish().unwrap(), 2000);

        let count = AviaryReader::new(&path)
            .iter()
            .unwrap()
            .map(|r| r.unwrap())
            .count();
        assert_eq!(count, 2000);
    }

    #[tokio::test]
    async fn test_open_streams_through_channel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aviary.json");
        let writer = AviaryWriter::create(&path).unwrap();
        for id in 0..50 {
            writer.write(&canary(id)).unwrap();
        }
        writer.finish().unwrap();

        let reader = AviaryReader::new(&path).with_channel_capacity(4);
        for _ in 0..2 {
            let mut rx = reader.open().unwrap();
            let mut count = 0;
            while let Some(record) = rx.recv().await {
                record.unwrap();
                count += 1;
            }
            assert_eq!(count, 50);
        }
    }
}
