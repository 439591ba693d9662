use super::lines::find_terminator;

/// Result of pulling one line out of the push-back buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum PushBackLine {
    /// A terminated line.
    Complete(String),
    /// The buffer ran dry mid-line; the transport must supply the rest.
    Partial(String),
    Empty,
}

/// Text logically "unread" from a connection.
///
/// Stored as a stack: the last element is consumed first. Each push call
/// places its lines so that they read back in the order given, ahead of
/// anything pushed earlier.
#[derive(Debug, Default)]
pub struct PushBack {
    stack: Vec<String>,
}

impl PushBack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<S: AsRef<str>>(&mut self, lines: &[S], add_newline: bool) {
        for line in lines.iter().rev() {
            let mut entry = line.as_ref().to_string();
            if add_newline {
                entry.push('\n');
            }
            self.stack.push(entry);
        }
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn clear(&mut self) {
        self.stack.clear();
    }

    pub fn next_line(&mut self) -> PushBackLine {
        let mut prefix = String::new();
        while let Some(entry) = self.stack.pop() {
            match find_terminator(&entry) {
                Some((pos, width)) => {
                    prefix.push_str(&entry[..pos]);
                    let rest = &entry[pos + width..];
                    if !rest.is_empty() {
                        self.stack.push(rest.to_string());
                    }
                    return PushBackLine::Complete(prefix);
                }
                None => prefix.push_str(&entry),
            }
        }
        if prefix.is_empty() {
            PushBackLine::Empty
        } else {
            PushBackLine::Partial(prefix)
        }
    }
}
