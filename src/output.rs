//! Terminal formatting for client commands

use hooklog_proto::{ActionResponse, RequestRecord, StoredPage};
use std::collections::BTreeMap;

pub fn format_record(record: &RequestRecord) -> String {
    let request = &record.request;
    let source = match (request.address.is_empty(), request.port.is_empty()) {
        (true, _) => "-".to_string(),
        (false, true) => request.address.clone(),
        (false, false) => format!("{}:{}", request.address, request.port),
    };

    format!(
        "{:>8}  {}  {:<7} {}  {}  {}",
        record.key,
        request.timestamp.format("%Y-%m-%d %H:%M:%S"),
        request.method,
        request.path,
        source,
        request.useragent
    )
    .trim_end()
    .to_string()
}

pub fn print_records<'a>(records: impl Iterator<Item = &'a RequestRecord>) {
    for record in records {
        println!("{}", format_record(record));
    }
}

pub fn print_count(shown: usize, total: usize) {
    if shown < total {
        println!("({} of {} requests)", shown, total);
    } else {
        println!("({} requests)", total);
    }
}

pub fn print_action(response: &ActionResponse) {
    match (&response.message, &response.error) {
        (Some(message), _) => println!("{}", message),
        (None, Some(error)) => println!("{}", error),
        (None, None) => println!("{}", if response.success { "OK" } else { "Failed" }),
    }
}

pub fn print_pages(pages: &BTreeMap<String, StoredPage>) {
    if pages.is_empty() {
        println!("No pages");
        return;
    }

    for (endpoint, page) in pages {
        let size = page.body.as_ref().map(|b| b.len()).unwrap_or(0);
        println!("/{}  {}  {} bytes", endpoint, page.status_code, size);
        for (name, value) in &page.headers {
            println!("    {}: {}", name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hooklog_proto::CapturedRequest;

    #[test]
    fn test_format_record() {
        let request = CapturedRequest::from_json(
            r#"{"address":"10.0.0.1","port":"5555","method":"POST","path":"/hook","useragent":"curl/8","timestamp":"2025-03-04T05:06:07Z"}"#,
        )
        .unwrap();
        let line = format_record(&RequestRecord::new(42, request));

        assert_eq!(
            line,
            "      42  2025-03-04 05:06:07  POST    /hook  10.0.0.1:5555  curl/8"
        );
    }
}
