//! Re-chunking of model tokens into whole lines

/// Accumulates arbitrary text fragments and releases complete lines.
///
/// Every line returned by [`LineBuffer::push`] ends with `'\n'`. Whatever
/// follows the last newline stays buffered until more text arrives or
/// [`LineBuffer::finish`] flushes it.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and take every line it completes
    pub fn push(&mut self, fragment: &str) -> Vec<String> {
        self.buffer.push_str(fragment);

        let Some(last_newline) = self.buffer.rfind('\n') else {
            return Vec::new();
        };

        let rest = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);
        complete.split_inclusive('\n').map(str::to_string).collect()
    }

    /// Flush the trailing partial line, if any
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }

    /// Buffered text not yet released
    pub fn pending(&self) -> &str {
        &self.buffer
    }
}

/// Re-chunk a whole fragment sequence at once
#[cfg(test)]
fn rechunk<I, S>(fragments: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut buffer = LineBuffer::new();
    let mut lines = Vec::new();
    for fragment in fragments {
        lines.extend(buffer.push(fragment.as_ref()));
    }
    lines.extend(buffer.finish());
    lines
}
