//! InsectMask: interactive mask editing and body-boundary quiz for
//! segmented insect photos.
//!
//! The desktop front end lives in [`app`]; everything it drives (layers,
//! strokes, history, crop, boundaries, quiz scoring) is plain data and can be
//! used headless through [`project::EditSession`] or the [`cli`].

#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]

pub mod logger;

pub mod app;
pub mod canvas;
pub mod cli;
pub mod components;
pub mod io;
pub mod ops;
pub mod project;
pub mod service;
pub mod settings;
pub mod viewport;
