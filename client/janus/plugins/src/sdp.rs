//! Stateless SDP text transforms.
//!
//! These operate on the raw session-description text and have no bearing on
//! connection or session state: candidate filtering keeps clients behind
//! TURN from being offered unreachable direct routes, and the H.264 profile
//! filter trims video payload types down to an allow-list.

use tracing::{error, warn};

/// True when an `a=candidate` line describes a direct route: a `host` or
/// `srflx` candidate, including their TCP variants.
pub fn is_direct_candidate(line: &str) -> bool {
    let mut tokens = line.split_whitespace().peekable();
    let mut candidate_type = None;
    let mut tcp_type = None;
    while let Some(token) = tokens.next() {
        match token {
            "typ" => candidate_type = tokens.peek().copied(),
            "tcptype" => tcp_type = tokens.peek().copied(),
            _ => {}
        }
    }
    matches!(candidate_type, Some("host") | Some("srflx"))
        || matches!(tcp_type, Some("host") | Some("srflx"))
}

/// Remove direct (`host`/`srflx`) candidates from `sdp`.
///
/// When every candidate in the description is direct, the unmodified input
/// is returned instead of an answer with no routes at all; `force` disables
/// that safety and strips them anyway.
pub fn filter_direct_candidates(sdp: &str, force: bool) -> String {
    let mut kept = Vec::new();
    let mut have_candidates = false;
    let mut have_indirect_candidates = false;

    for line in sdp.lines() {
        if line.starts_with("a=candidate") {
            have_candidates = true;
            if !is_direct_candidate(line) {
                kept.push(line);
                have_indirect_candidates = true;
            }
        } else {
            kept.push(line);
        }
    }

    if have_candidates && !have_indirect_candidates {
        if !force {
            warn!("sdp carries only direct candidates, leaving it untouched");
            return sdp.to_owned();
        }
        error!("direct candidates filtered out with no other candidates left");
    }

    join_crlf(&kept)
}

/// Keep only the H.264 payload types whose `profile-level-id` appears in
/// `allowed_profiles`, leaving every other codec and all non-video sections
/// untouched.
pub fn filter_h264_profiles(sdp: &str, allowed_profiles: &[&str]) -> String {
    let mut kept = Vec::new();
    for section in split_media_sections(sdp) {
        if section
            .first()
            .map(|line| line.starts_with("m=video"))
            .unwrap_or(false)
        {
            filter_video_section(&section, allowed_profiles, &mut kept);
        } else {
            kept.extend(section);
        }
    }
    join_crlf(&kept)
}

/// Split into the session part followed by one group per `m=` line.
fn split_media_sections(sdp: &str) -> Vec<Vec<&str>> {
    let mut sections = vec![Vec::new()];
    for line in sdp.lines() {
        if line.starts_with("m=") {
            sections.push(Vec::new());
        }
        if let Some(section) = sections.last_mut() {
            section.push(line);
        }
    }
    sections.retain(|section| !section.is_empty());
    sections
}

fn filter_video_section<'a>(section: &[&'a str], allowed_profiles: &[&str], kept: &mut Vec<&'a str>) {
    // Group the section into the preamble plus one group per a=rtpmap line.
    let mut groups: Vec<Vec<&str>> = vec![Vec::new()];
    for line in section {
        if line.starts_with("a=rtpmap:") {
            groups.push(Vec::new());
        }
        if let Some(group) = groups.last_mut() {
            group.push(line);
        }
    }

    let mut group_iter = groups.into_iter();
    if let Some(preamble) = group_iter.next() {
        kept.extend(preamble);
    }
    for group in group_iter {
        let rtpmap = group.first().copied().unwrap_or_default();
        let is_h264 = rtpmap
            .split_once(' ')
            .map(|(_, codec)| codec.starts_with("H264/"))
            .unwrap_or(false);
        if !is_h264 {
            kept.extend(group);
            continue;
        }
        let fmtp = group
            .iter()
            .find(|line| line.starts_with("a=fmtp:"))
            .copied()
            .unwrap_or_default();
        let allowed = allowed_profiles
            .iter()
            .any(|profile| fmtp.contains(&format!("profile-level-id={profile}")));
        if allowed {
            kept.extend(group);
        }
    }
}

fn join_crlf(lines: &[&str]) -> String {
    let mut joined = lines.join("\r\n");
    joined.push_str("\r\n");
    joined
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELAY: &str =
        "a=candidate:1 1 udp 41885439 198.51.100.7 3478 typ relay raddr 192.0.2.5 rport 54321";
    const HOST: &str = "a=candidate:2 1 udp 2113937151 192.0.2.5 54400 typ host";
    const SRFLX: &str =
        "a=candidate:3 1 udp 1677729535 203.0.113.9 54401 typ srflx raddr 192.0.2.5 rport 54400";
    const TCP_HOST: &str =
        "a=candidate:4 1 tcp 1518280447 192.0.2.5 9 typ relay tcptype host raddr 0.0.0.0 rport 9";

    #[test]
    fn classifies_candidates() {
        assert!(!is_direct_candidate(RELAY));
        assert!(is_direct_candidate(HOST));
        assert!(is_direct_candidate(SRFLX));
        assert!(is_direct_candidate(TCP_HOST));
    }

    #[test]
    fn filters_direct_candidates() {
        let sdp = format!("v=0\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\n{HOST}\r\n{RELAY}\r\n{SRFLX}\r\n");
        let filtered = filter_direct_candidates(&sdp, false);
        assert!(filtered.contains(RELAY));
        assert!(!filtered.contains(HOST));
        assert!(!filtered.contains(SRFLX));
    }

    #[test]
    fn refuses_to_strip_the_last_candidates() {
        let sdp = format!("v=0\r\n{HOST}\r\n{SRFLX}\r\n");
        assert_eq!(filter_direct_candidates(&sdp, false), sdp);

        let forced = filter_direct_candidates(&sdp, true);
        assert!(!forced.contains("a=candidate"));
    }

    #[test]
    fn filters_h264_profiles() {
        let sdp = concat!(
            "v=0\r\n",
            "m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n",
            "a=rtpmap:111 opus/48000/2\r\n",
            "m=video 9 UDP/TLS/RTP/SAVPF 96 97 98\r\n",
            "a=mid:video\r\n",
            "a=rtpmap:96 VP8/90000\r\n",
            "a=rtcp-fb:96 nack\r\n",
            "a=rtpmap:97 H264/90000\r\n",
            "a=fmtp:97 profile-level-id=42e01f;packetization-mode=1\r\n",
            "a=rtpmap:98 H264/90000\r\n",
            "a=fmtp:98 profile-level-id=640c1f;packetization-mode=1\r\n",
        );

        let filtered = filter_h264_profiles(sdp, &["42e01f"]);
        assert!(filtered.contains("a=rtpmap:111 opus/48000/2"));
        assert!(filtered.contains("a=rtpmap:96 VP8/90000"));
        assert!(filtered.contains("a=rtpmap:97 H264/90000"));
        assert!(filtered.contains("profile-level-id=42e01f"));
        assert!(!filtered.contains("a=rtpmap:98 H264/90000"));
        assert!(!filtered.contains("profile-level-id=640c1f"));
    }
}
