//! Debug tracing of socket contents around `exec`.
//!
//! Tracing is an observer: a task with `debug` enabled calls its [`ExecHook`]
//! once before the codelet (inputs) and once after it (outputs and status).
//! The default hook, [`DebugTracer`], prints a textual dump bounded by
//! [`DebugOptions::limit`] elements and [`DebugOptions::frame_max`] frames.
//!
//! ```text
//! # source::generate(int32 out[8])
//! # {OUT}    out = [1, 2, 3, 4, 5, 6, 7, 8]
//! # Returned status: [0]
//! ```

use std::io::Write;

use crate::buffer::Buffer;
use crate::io::TaskIo;
use crate::socket::{Socket, SocketKind};

/// Formatting bounds for traced socket contents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DebugOptions {
    /// Print integers and float bit patterns in hexadecimal.
    pub hex: bool,
    /// Maximum number of elements shown per frame; `None` shows all.
    pub limit: Option<usize>,
    /// Decimals shown for floating-point values.
    pub precision: usize,
    /// Maximum number of frames shown per socket; `None` shows all.
    pub frame_max: Option<usize>,
}

impl Default for DebugOptions {
    fn default() -> Self {
        Self {
            hex: false,
            limit: None,
            precision: 2,
            frame_max: None,
        }
    }
}

/// Observer invoked around a task's codelet when `debug` is enabled.
///
/// Hooks must not change the exec outcome; I/O failures are theirs to report.
pub trait ExecHook: Send {
    /// Called after inputs are staged, before the codelet runs.
    fn before_exec(&mut self, io: &TaskIo<'_>, options: &DebugOptions);

    /// Called after the codelet returned `status`.
    fn after_exec(&mut self, io: &TaskIo<'_>, options: &DebugOptions, status: i32);
}

/// Default hook: writes a textual dump of the sockets to a writer.
pub struct DebugTracer {
    out: Box<dyn Write + Send>,
}

impl DebugTracer {
    /// Creates a tracer writing to standard output.
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    /// Creates a tracer writing to `out`.
    ///
    /// Write errors never reach the traced task. They are logged through
    /// `tracing::warn!` when the `tracing` feature is on, and dropped otherwise.
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self { out: Box::new(out) }
    }

    fn emit(&mut self, text: &str) {
        if let Err(_err) = self
            .out
            .write_all(text.as_bytes())
            .and_then(|()| self.out.flush())
        {
            #[cfg(feature = "tracing")]
            tracing::warn!("debug_trace: write failed: {_err}");
        }
    }
}

impl std::fmt::Debug for DebugTracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugTracer").finish_non_exhaustive()
    }
}

impl ExecHook for DebugTracer {
    fn before_exec(&mut self, io: &TaskIo<'_>, options: &DebugOptions) {
        let signature: Vec<String> = io
            .sockets()
            .iter()
            .map(|s| format!("{} {}[{}]", s.data_type(), s.name(), s.len()))
            .collect();
        let mut text = format!(
            "# {}::{}({})\n",
            io.module().name(),
            io.task_name(),
            signature.join(", ")
        );
        for (idx, socket) in io.sockets().iter().enumerate() {
            if socket.kind().is_input() {
                text.push_str(&trace_socket(io, idx, socket, options));
            }
        }
        self.emit(&text);
    }

    fn after_exec(&mut self, io: &TaskIo<'_>, options: &DebugOptions, status: i32) {
        let mut text = String::new();
        for (idx, socket) in io.sockets().iter().enumerate() {
            if socket.kind().is_output() {
                text.push_str(&trace_socket(io, idx, socket, options));
            }
        }
        text.push_str(&format!("# Returned status: [{status}]\n#\n"));
        self.emit(&text);
    }
}

fn trace_socket(io: &TaskIo<'_>, idx: usize, socket: &Socket, options: &DebugOptions) -> String {
    let label = match socket.kind() {
        SocketKind::In => "{IN}",
        SocketKind::InOut => "{IN_OUT}",
        SocketKind::Out => "{OUT}",
    };
    let prefix = format!("# {label:<8} {} = ", socket.name());
    match io.buffer(idx) {
        Ok(buffer) => {
            let frames = format_frames(&buffer, io.n_frames(), options);
            let indent = format!("#{}", " ".repeat(prefix.len() - 1));
            let mut text = String::new();
            for (i, line) in frames.iter().enumerate() {
                text.push_str(if i == 0 { &prefix } else { &indent });
                text.push_str(line);
                text.push('\n');
            }
            text
        }
        Err(err) => format!("{prefix}<{err}>\n"),
    }
}

/// Splits `buffer` into `n_frames` frames and formats each as `[a, b, ...]`,
/// prefixed with `fN:` when there is more than one frame.
///
/// A frame count that does not divide the buffer length formats the whole
/// buffer as a single frame.
pub fn format_frames(buffer: &Buffer, n_frames: usize, options: &DebugOptions) -> Vec<String> {
    let n_frames = match n_frames.max(1) {
        n if buffer.len() % n == 0 => n,
        _ => 1,
    };
    let frame_len = buffer.len() / n_frames;
    let shown_frames = options.frame_max.map_or(n_frames, |m| m.min(n_frames));
    let shown_elems = options.limit.map_or(frame_len, |l| l.min(frame_len));

    let mut lines = Vec::with_capacity(shown_frames + 1);
    for f in 0..shown_frames {
        let start = f * frame_len;
        let mut line = String::new();
        if n_frames > 1 {
            line.push_str(&format!("f{}:", f + 1));
        }
        line.push('[');
        line.push_str(&buffer.format_range(
            start..start + shown_elems,
            options.hex,
            options.precision,
        ));
        if shown_elems < frame_len {
            line.push_str(", ...");
        }
        line.push(']');
        lines.push(line);
    }
    if shown_frames < n_frames {
        lines.push(format!("({} more frames)", n_frames - shown_frames));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_frame_unbounded() {
        let buf = Buffer::from_slice(&[1i32, 2, 3]);
        let lines = format_frames(&buf, 1, &DebugOptions::default());
        assert_eq!(lines, vec!["[1, 2, 3]".to_string()]);
    }

    #[test]
    fn limit_truncates_each_frame() {
        let buf = Buffer::from_slice(&[1i32, 2, 3, 4, 5, 6]);
        let opts = DebugOptions {
            limit: Some(2),
            ..DebugOptions::default()
        };
        let lines = format_frames(&buf, 2, &opts);
        assert_eq!(lines, vec!["f1:[1, 2, ...]", "f2:[4, 5, ...]"]);
    }

    #[test]
    fn frame_max_hides_trailing_frames() {
        let buf = Buffer::from_slice(&[1u8, 2, 3, 4, 5, 6]);
        let opts = DebugOptions {
            frame_max: Some(1),
            hex: true,
            ..DebugOptions::default()
        };
        let lines = format_frames(&buf, 3, &opts);
        assert_eq!(lines, vec!["f1:[0x1, 0x2]", "(2 more frames)"]);
    }

    #[test]
    fn uneven_frames_keep_every_element() {
        let buf = Buffer::from_slice(&[1i32, 2, 3, 4, 5]);
        let opts = DebugOptions::default();
        assert_eq!(format_frames(&buf, 2, &opts), vec!["[1, 2, 3, 4, 5]"]);
        assert_eq!(format_frames(&buf, 8, &opts), vec!["[1, 2, 3, 4, 5]"]);
        assert_eq!(format_frames(&buf, 5, &opts).len(), 5);
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("sink closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failing_sink_does_not_change_status() {
        let m = crate::Module::new("m");
        let mut b = m.task_builder("t");
        let out = b.create_socket_out("out", 2, crate::DataType::U8).unwrap();
        b.create_codelet(move |_, io| {
            io.output::<u8>(out)?.fill(1);
            Ok(7)
        })
        .unwrap();
        let mut t = b.build();
        t.set_exec_hook(Box::new(DebugTracer::new(Broken)));
        t.set_debug(true);
        assert_eq!(t.exec().unwrap(), 7);
        assert_eq!(t[out].with_data::<u8, _>(<[u8]>::to_vec).unwrap(), vec![1, 1]);
    }

    #[test]
    fn float_precision() {
        let buf = Buffer::from_slice(&[0.125f64, 2.0]);
        let opts = DebugOptions {
            precision: 3,
            ..DebugOptions::default()
        };
        assert_eq!(format_frames(&buf, 1, &opts), vec!["[0.125, 2.000]"]);
    }
}
