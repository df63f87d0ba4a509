//! CSV export of the conversation log.

use crate::store::ConversationRecord;
use crate::web::templates::display_timestamp;

pub const CSV_HEADER: [&str; 4] = ["Username", "User Message", "Bot Reply", "Timestamp"];

/// Serialize records (already in the desired order) as RFC 4180 CSV with a
/// header row.
pub fn records_to_csv(records: &[ConversationRecord]) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for record in records {
        writer.write_record([
            record.username.as_str(),
            record.message.as_str(),
            record.bot_reply.as_str(),
            display_timestamp(record).as_str(),
        ])?;
    }
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn record(id: i64, message: &str, reply: &str) -> ConversationRecord {
        ConversationRecord {
            id,
            user_id: "7".into(),
            username: "Sara".into(),
            message: message.into(),
            bot_reply: reply.into(),
            timestamp: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
        }
    }

    #[test]
    fn header_only_when_empty() {
        let out = String::from_utf8(records_to_csv(&[]).unwrap()).unwrap();
        assert_eq!(out, "Username,User Message,Bot Reply,Timestamp\n");
    }

    #[test]
    fn one_line_per_record() {
        let records = vec![record(1, "hi", "hello"), record(2, "bye", "ciao")];
        let out = String::from_utf8(records_to_csv(&records).unwrap()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "Sara,hi,hello,2026-01-02 03:04:05");
        assert_eq!(lines[2], "Sara,bye,ciao,2026-01-02 03:04:05");
    }

    #[test]
    fn quotes_commas_and_quotes() {
        let records = vec![record(1, "a, b", "say \"hi\"")];
        let out = String::from_utf8(records_to_csv(&records).unwrap()).unwrap();
        assert!(out.contains("Sara,\"a, b\",\"say \"\"hi\"\"\","), "{out}");
    }
}
