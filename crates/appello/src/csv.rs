//! Minimal CSV writer.
//!
//! Fields containing a comma, quote, CR or LF are wrapped in quotes with
//! embedded quotes doubled. Rows end with `\n`.

pub fn escape_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r')
    {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[derive(Debug, Default)]
pub struct CsvWriter {
    buf: String,
}

impl CsvWriter {
    pub fn with_header(header: &[&str]) -> Self {
        let mut writer = CsvWriter::default();
        writer.push_row(header.iter().copied());
        writer
    }

    pub fn push_row<'a>(&mut self, fields: impl IntoIterator<Item = &'a str>) {
        let line = fields
            .into_iter()
            .map(escape_field)
            .collect::<Vec<_>>()
            .join(",");
        self.buf.push_str(&line);
        self.buf.push('\n');
    }

    pub fn finish(self) -> String {
        self.buf
    }
}
