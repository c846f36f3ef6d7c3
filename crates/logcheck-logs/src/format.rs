use logcheck_types::{ContainerIdentity, LogLine};

/// Separator line closing each stream section
pub const SECTION_SEPARATOR: &str = "<br>\n";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One stream's section of the report, lines sorted by timestamp
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamReport {
    pub stream_name: String,
    pub identity: ContainerIdentity,
    pub lines: Vec<LogLine>,
}

impl StreamReport {
    /// Header, one line per event, then the separator
    pub fn render(&self) -> impl Iterator<Item = String> + '_ {
        header_lines(&self.stream_name, &self.identity)
            .into_iter()
            .chain(self.lines.iter().map(event_line))
            .chain(std::iter::once(SECTION_SEPARATOR.to_string()))
    }
}

/// The three header lines of a stream section
pub fn header_lines(stream_name: &str, identity: &ContainerIdentity) -> [String; 3] {
    [
        format!("<b>Parse stream</b> :{}<br>\n", escape(stream_name)),
        format!("<b>Container Image</b> :{}<br>\n", escape(&identity.container_image)),
        format!("<b>Container Name</b> :{}<br>\n", escape(&identity.container_name)),
    ]
}

/// `YYYY-MM-DD HH:MM:SS UTC: message<br>\n`
pub fn event_line(line: &LogLine) -> String {
    let time = match line.time() {
        Some(time) => time.format(TIME_FORMAT).to_string(),
        None => line.timestamp.to_string(),
    };
    let message = line.message.trim_end_matches(['\r', '\n']);
    format!("{time} UTC: {}<br>\n", escape(message))
}

/// Minimal HTML escaping so log content cannot break the mail markup
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_line_format() {
        // 2024-01-15 10:30:00.250 UTC
        let line = LogLine::new(1_705_314_600_250, "ERROR: boom\n");
        assert_eq!(event_line(&line), "2024-01-15 10:30:00 UTC: ERROR: boom<br>\n");
    }

    #[test]
    fn test_escapes_markup() {
        let line = LogLine::new(0, "<script>a && b</script>");
        assert_eq!(
            event_line(&line),
            "1970-01-01 00:00:00 UTC: &lt;script&gt;a &amp;&amp; b&lt;/script&gt;<br>\n"
        );
    }

    #[test]
    fn test_render_section() {
        let report = StreamReport {
            stream_name: "kube.var.log.containers.api".to_string(),
            identity: ContainerIdentity {
                pod_name: "api-0".to_string(),
                container_image: "api:1.0".to_string(),
                container_name: "api".to_string(),
            },
            lines: vec![LogLine::new(0, "one"), LogLine::new(1_000, "two")],
        };
        let rendered: Vec<String> = report.render().collect();
        assert_eq!(
            rendered,
            vec![
                "<b>Parse stream</b> :kube.var.log.containers.api<br>\n",
                "<b>Container Image</b> :api:1.0<br>\n",
                "<b>Container Name</b> :api<br>\n",
                "1970-01-01 00:00:00 UTC: one<br>\n",
                "1970-01-01 00:00:01 UTC: two<br>\n",
                "<br>\n",
            ]
        );
    }
}
