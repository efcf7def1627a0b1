use camino::Utf8Path;
use human_repr::HumanCount;

use crate::ReleaseFile;

/// Where user-facing progress goes.
#[derive(Clone, Copy, Debug, Default)]
pub enum GoupLogger {
    #[cfg(feature = "console")]
    Console,
    Plain,
    #[default]
    Silent,
}

impl GoupLogger {
    pub fn report_step(&self, message: impl core::fmt::Display) {
        match self {
            #[cfg(feature = "console")]
            GoupLogger::Console => println!("{message}"),
            GoupLogger::Plain => println!("[goup] :: {message}"),
            GoupLogger::Silent => {},
        }
    }

    #[must_use]
    pub fn report_archive_download<'a>(&self, file: &'a ReleaseFile) -> GoupLoggerFeedback<'a> {
        let render = file.filename.as_str();
        let phantom = core::marker::PhantomData;
        match self {
            #[cfg(feature = "console")]
            GoupLogger::Console => {
                let bar = indicatif::ProgressBar::new(file.size);
                bar.set_style(console::download_style());
                bar.set_message(render.to_owned());
                GoupLoggerFeedback::Console { render, bar }
            },
            GoupLogger::Plain => GoupLoggerFeedback::Plain { render },
            GoupLogger::Silent => GoupLoggerFeedback::Silent { phantom },
        }
    }

    #[must_use]
    pub fn report_archive_verify<'a>(&self, archive: &'a Utf8Path) -> GoupLoggerFeedback<'a> {
        let render = archive.file_name().unwrap_or_else(|| archive.as_str());
        let phantom = core::marker::PhantomData;
        match self {
            #[cfg(feature = "console")]
            GoupLogger::Console => GoupLoggerFeedback::Console {
                render,
                bar: indicatif::ProgressBar::hidden(),
            },
            GoupLogger::Plain => GoupLoggerFeedback::Plain { render },
            GoupLogger::Silent => GoupLoggerFeedback::Silent { phantom },
        }
    }

    #[must_use]
    pub fn report_archive_unpack<'a>(&self, archive: &'a Utf8Path) -> GoupLoggerFeedback<'a> {
        let render = archive.file_name().unwrap_or_else(|| archive.as_str());
        let phantom = core::marker::PhantomData;
        match self {
            #[cfg(feature = "console")]
            GoupLogger::Console => {
                let bar = indicatif::ProgressBar::new_spinner();
                bar.set_style(console::unpack_style());
                GoupLoggerFeedback::Console { render, bar }
            },
            GoupLogger::Plain => GoupLoggerFeedback::Plain { render },
            GoupLogger::Silent => GoupLoggerFeedback::Silent { phantom },
        }
    }
}

pub enum GoupLoggerFeedback<'a> {
    #[cfg(feature = "console")]
    Console {
        render: &'a str,
        bar: indicatif::ProgressBar,
    },
    Plain {
        render: &'a str,
    },
    Silent {
        phantom: core::marker::PhantomData<&'a GoupLogger>,
    },
}

impl core::fmt::Debug for GoupLoggerFeedback<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            #[cfg(feature = "console")]
            GoupLoggerFeedback::Console { .. } => f.debug_struct("GoupLoggerFeedback::Console").finish_non_exhaustive(),
            GoupLoggerFeedback::Plain { .. } => f.debug_struct("GoupLoggerFeedback::Plain").finish_non_exhaustive(),
            GoupLoggerFeedback::Silent { .. } => f.debug_struct("GoupLoggerFeedback::Silent").finish_non_exhaustive(),
        }
    }
}

impl GoupLoggerFeedback<'_> {
    pub fn report_already_downloaded(&mut self, total_bytes: u64) {
        match self {
            #[cfg(feature = "console")]
            GoupLoggerFeedback::Console { render, bar } => {
                let size = total_bytes.human_count_bytes();
                bar.finish_and_clear();
                println!("skipping download: {render} [{size}]");
            },
            GoupLoggerFeedback::Plain { render } => {
                let size = total_bytes.human_count_bytes();
                println!("[goup] :: skipping: {render} [{size}]");
            },
            GoupLoggerFeedback::Silent { .. } => {},
        }
    }

    pub fn report_content_length(&mut self, content_length: u64) {
        match self {
            #[cfg(feature = "console")]
            GoupLoggerFeedback::Console { bar, .. } => bar.set_length(content_length),
            GoupLoggerFeedback::Plain { .. } | GoupLoggerFeedback::Silent { .. } => {},
        }
    }

    pub fn report_bytes_downloaded(&mut self, bytes: u64) {
        match self {
            #[cfg(feature = "console")]
            GoupLoggerFeedback::Console { bar, .. } => bar.inc(bytes),
            GoupLoggerFeedback::Plain { .. } | GoupLoggerFeedback::Silent { .. } => {},
        }
    }

    pub fn report_finished_downloading(&mut self, total_bytes: u64) {
        match self {
            #[cfg(feature = "console")]
            GoupLoggerFeedback::Console { bar, .. } => bar.finish(),
            GoupLoggerFeedback::Plain { render } => {
                let size = total_bytes.human_count_bytes();
                println!("[goup] :: download: {render} [{size}]");
            },
            GoupLoggerFeedback::Silent { .. } => {},
        }
    }

    pub fn report_checksum_verified(&mut self) {
        match self {
            #[cfg(feature = "console")]
            GoupLoggerFeedback::Console { render, .. } => println!("verified: {render}"),
            GoupLoggerFeedback::Plain { render } => println!("[goup] :: verified: {render}"),
            GoupLoggerFeedback::Silent { .. } => {},
        }
    }

    pub fn report_member_unpacked(&mut self, member: &std::path::Path) {
        match self {
            #[cfg(feature = "console")]
            GoupLoggerFeedback::Console { bar, .. } => {
                bar.inc(1);
                bar.set_message(member.display().to_string());
            },
            GoupLoggerFeedback::Plain { .. } | GoupLoggerFeedback::Silent { .. } => {},
        }
        #[cfg(feature = "tracing")]
        tracing::trace!(member = %member.display(), "unpacked");
        #[cfg(not(feature = "tracing"))]
        let _ = member;
    }

    pub fn report_finished_unpacking(&mut self, members: u64) {
        match self {
            #[cfg(feature = "console")]
            GoupLoggerFeedback::Console { render, bar } => {
                bar.finish_and_clear();
                println!("unpacked: {render} [{members} members]");
            },
            GoupLoggerFeedback::Plain { render } => println!("[goup] :: unpack: {render} [{members} members]"),
            GoupLoggerFeedback::Silent { .. } => {},
        }
    }
}

#[cfg(feature = "console")]
mod console {
    use indicatif::ProgressStyle;

    pub(super) fn download_style() -> ProgressStyle {
        ProgressStyle::with_template("{msg} [{bar:40}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")
            .map(|style| style.progress_chars("=> "))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
    }

    pub(super) fn unpack_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner} unpacking {pos} members {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }
}
