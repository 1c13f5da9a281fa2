//! # Enfasten
//!
//! A post-processor for static site output. It takes the directory your site
//! generator wrote, downsamples every PNG and JPEG to a set of widths, and
//! writes a copy of the site whose `<img>` tags carry `srcset`, so browsers
//! fetch an image sized for the screen instead of the full original.
//!
//! # Architecture: One Incremental Pass
//!
//! ```text
//! _site/ ──discover──→ FoundImage (path + SHA-256)
//!                          │ slug = <stem>-<8 hex>
//!                          ▼
//!   manifest.json ──→ reconcile ──→ optimizer ──→ cull ──→ new manifest
//!                                                             │
//! _site/ ──────────────→ rewrite <img> tags ──→ _fastsite/    │
//!                                                   │         │
//!                                     gc (delete anything not written) ──→ save
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`identity`] | Content digests, slugs and input-relative keys |
//! | [`discover`] | Walks the input tree for images, applies exclusion globs |
//! | [`manifest`] | Slug → built files, persisted between runs as the build cache |
//! | [`imaging`] | Width planning, resize and re-encode behind the [`imaging::ImageBackend`] trait |
//! | [`process`] | Cache reconciliation, external optimizer, culling |
//! | [`rewrite`] | Mirrors the site and rewrites `<img>` tags |
//! | [`gc`] | Whitelist of written paths and deletion of everything else |
//! | [`pipeline`] | Runs the stages in order; also the dry-run `check` |
//! | [`config`] | `enfasten.toml` loading and validation |
//! | [`types`] | Data shared between stages (`FoundImage`, `BuiltImage`) |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Content-Addressed Output
//!
//! Every output file name starts with the image's slug, which ends in the
//! first four bytes of its SHA-256. Editing an image changes its slug, so a
//! cached entry can never be stale: it is either the right one or it isn't
//! looked up. Old slugs fall out of the manifest and their files get deleted.
//! It also makes outputs safe to serve with far-future cache headers.
//!
//! ## The Output Folder Is Owned
//!
//! The output folder is rebuilt to contain exactly what this run wrote. Each
//! stage records the paths it writes into a [`gc::Whitelist`] and everything
//! else is deleted at the end. Don't point `output_folder` at anything you
//! want to keep.
//!
//! ## Regex, Not an HTML Parser
//!
//! `<img>` tags are matched with a deliberately narrow regular expression and
//! rewritten in place. Everything outside a matched tag is copied byte for
//! byte, so the rewriter never reformats the generator's markup. The exact
//! contract is documented in [`rewrite`].
//!
//! ## Bigger Files Get Culled
//!
//! Downsampling doesn't always shrink the file, especially after an external
//! optimizer has been at the larger sizes. A variant that isn't strictly
//! smaller than every wider one is dropped; see [`process::cull`].

pub mod config;
pub mod discover;
pub mod gc;
pub mod identity;
pub mod imaging;
pub mod manifest;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod rewrite;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
