//-
// Copyright (c) 2020, 2023, Jason Lingle
//
// This file is part of Letterbox.
//
// Letterbox is free software: you can  redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Letterbox is distributed  in the hope that  it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License
// for more details.
//
// You should have received a copy of the GNU General Public License along with
// Letterbox. If not, see <http://www.gnu.org/licenses/>.

/// A bug report relayed through a mailing list: UNIX line endings, a long
/// trace-header block and a PGP-signed multipart body.
///
/// Its subject is `Bug#1024883: Reconsider versioned dependencies of
/// libpinyin-data`.
pub static DEBIAN_BUG_1024883: &[u8] = include_bytes!("debian_bug_1024883.eml");

/// A multipart/alternative message with DOS line endings whose `Subject` is
/// folded across two encoded words (one `B`, one `Q`, both UTF-8). The body
/// contains a line that looks like a `Subject` header.
///
/// Its decoded subject is `[大家好] 最新事项 and café`.
pub static FOLDED_ENCODED_SUBJECT: &[u8] =
    include_bytes!("folded_encoded_subject.eml");
