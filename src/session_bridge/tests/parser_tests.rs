use super::*;

#[test]
fn test_parse_definitive_success() {
    let line = r#"{"success":true,"sessionKey":"sk-ant-1","orgId":"org-1","username":"Ada","userEmail":"ada@example.com","cookieString":"sessionKey=sk-ant-1; lastActiveOrg=org-1"}"#;
    let StatusLine::Credential(credential) = parse_status_line(line) else {
        panic!("expected credential");
    };
    assert_eq!(credential.session_key, "sk-ant-1");
    assert_eq!(credential.org_id, "org-1");
    assert_eq!(credential.display_name.as_deref(), Some("Ada"));
    assert_eq!(credential.email.as_deref(), Some("ada@example.com"));
    assert_eq!(
        credential.cookie_header.as_deref(),
        Some("sessionKey=sk-ant-1; lastActiveOrg=org-1")
    );
}

#[test]
fn test_success_without_required_fields_is_ignored() {
    for line in [
        r#"{"success":true}"#,
        r#"{"success":true,"sessionKey":"sk"}"#,
        r#"{"success":true,"sessionKey":"","orgId":"org"}"#,
        r#"{"success":true,"sessionKey":"sk","orgId":42}"#,
        r#"{"success":"true","sessionKey":"sk","orgId":"org"}"#,
    ] {
        assert_eq!(parse_status_line(line), StatusLine::Ignored, "line: {}", line);
    }
}

#[test]
fn test_parse_reported_failure() {
    assert_eq!(
        parse_status_line(r#"{"success":false,"error":"login window closed"}"#),
        StatusLine::ReportedFailure("login window closed".to_string())
    );
    assert_eq!(
        parse_status_line(r#"{"success":false}"#),
        StatusLine::Ignored
    );
}

#[test]
fn test_noise_is_ignored() {
    for line in [
        "",
        "   ",
        "Launching browser...",
        "[info] {\"success\":true}",
        "{not json",
        "[1, 2, 3]",
        r#"{"status":"waiting"}"#,
    ] {
        assert_eq!(parse_status_line(line), StatusLine::Ignored, "line: {}", line);
    }
}

#[test]
fn test_line_buffer_holds_partial_lines() {
    let mut buffer = LineBuffer::default();
    assert!(buffer.push(b"{\"a\":").is_empty());
    assert_eq!(buffer.push(b"1}\n{\"b\""), vec!["{\"a\":1}".to_string()]);
    assert_eq!(
        buffer.push(b":2}\r\nnoise\n"),
        vec!["{\"b\":2}".to_string(), "noise".to_string()]
    );
    assert!(buffer.push(b"tail").is_empty());
    assert_eq!(buffer.all_lines(), vec!["{\"a\":1}", "{\"b\":2}", "noise", "tail"]);
}

#[test]
fn test_line_buffer_retains_only_recent_completed_lines() {
    let mut buffer = LineBuffer::default();
    let noise = format!("{}\n", "x".repeat(1023));
    for _ in 0..(MAX_RETAINED_BYTES / noise.len()) * 2 {
        buffer.push(noise.as_bytes());
    }
    buffer.push(b"last line\npartial");

    assert!(buffer.data.len() <= MAX_RETAINED_BYTES + "partial".len());
    assert_eq!(buffer.bytes_seen(), (MAX_RETAINED_BYTES / noise.len()) * 2 * noise.len() + 17);
    let lines = buffer.all_lines();
    assert_eq!(lines.last().map(String::as_str), Some("partial"));
    assert_eq!(lines[lines.len() - 2], "last line");
    assert!(lines[..lines.len() - 2].iter().all(|line| line.len() == 1023));
}

#[test]
fn test_line_buffer_drops_oversized_unterminated_line() {
    let mut buffer = LineBuffer::default();
    buffer.push(b"kept\n");
    buffer.push(&vec![b'y'; MAX_PENDING_LINE_BYTES + 1]);
    assert_eq!(buffer.all_lines(), vec!["kept"]);

    assert!(buffer.push(b"yyyy").is_empty());
    assert_eq!(buffer.push(b"yy\n{\"ok\":1}\n"), vec!["{\"ok\":1}".to_string()]);
    assert_eq!(buffer.all_lines(), vec!["kept", "{\"ok\":1}"]);
}

#[test]
fn test_line_buffer_tolerates_invalid_utf8() {
    let mut buffer = LineBuffer::default();
    let lines = buffer.push(b"\xff\xfeok\n");
    assert_eq!(lines.len(), 1);
    assert!(lines[0].ends_with("ok"));
}

#[test]
fn test_scanner_split_success_across_chunks() {
    let mut scanner = OutputScanner::default();
    assert!(scanner.feed(br#"{"success":true,"sessionKey":"#).is_none());
    assert!(scanner.feed(br#""sk-2","orgId":"org-2"}"#).is_none());
    let credential = scanner.feed(b"\n").expect("credential after newline");
    assert_eq!(credential.org_id, "org-2");
}

#[test]
fn test_scanner_remembers_failure_but_success_wins() {
    let mut scanner = OutputScanner::default();
    assert!(scanner
        .feed(b"{\"success\":false,\"error\":\"captcha\"}\n")
        .is_none());
    assert_eq!(scanner.reported_failure(), Some("captcha"));

    let credential = scanner
        .feed(b"{\"success\":true,\"sessionKey\":\"sk\",\"orgId\":\"org\"}\n")
        .expect("later success still commits");
    assert_eq!(credential.session_key, "sk");
}

#[test]
fn test_scanner_finish_reads_unterminated_tail() {
    let mut scanner = OutputScanner::default();
    assert!(scanner
        .feed(b"starting\n{\"success\":true,\"sessionKey\":\"sk\",\"orgId\":\"org-9\"}")
        .is_none());
    let credential = scanner.finish().expect("tail is rescanned");
    assert_eq!(credential.org_id, "org-9");
    assert!(scanner.bytes_seen() > 0);
}

#[test]
fn test_scanner_finish_without_credential() {
    let mut scanner = OutputScanner::default();
    scanner.feed(b"noise only");
    assert!(scanner.finish().is_none());
    assert!(scanner.reported_failure().is_none());
}
