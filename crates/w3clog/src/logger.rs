// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log line format for the shipper process.
//!
//! ```text
//! W3CLOG | LEVEL | message fields [| context]
//! ```
//!
//! The context is the fields of every enclosing span, outermost first. Spans
//! without fields, such as `pass`, add nothing.
//!
//! ```text
//! W3CLOG | INFO | Pass finished candidates=12 processed=1 records=480 deleted=2 failed=0 walk_errors=0
//! W3CLOG | WARN | Fields directive lacks required columns ["sc-bytes"] | site="W3SVC1" day="240501"
//! ```

use std::fmt;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;

/// Prefix that makes shipper output easy to pick out of a shared log stream.
pub const LOG_PREFIX: &str = "W3CLOG";

#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(writer, "{LOG_PREFIX} | {} | ", event.metadata().level())?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;

        let mut separator = " | ";
        for span in ctx.event_scope().into_iter().flat_map(|scope| scope.from_root()) {
            let ext = span.extensions();
            let Some(fields) = ext.get::<FormattedFields<N>>() else {
                continue;
            };
            if fields.is_empty() {
                continue;
            }
            write!(writer, "{separator}{fields}")?;
            separator = " ";
        }
        writeln!(writer)
    }
}
