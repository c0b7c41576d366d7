use std::fmt::Write;

use expect_test::{expect, Expect};

use crate::file::SegmentKind;

use super::JpegParser;

fn dump(jpeg: &[u8]) -> String {
    fn dump_impl(jpeg: &[u8], out: &mut String) -> super::Result<()> {
        let mut parser = JpegParser::new(jpeg)?;

        while let Some(segment) = parser.next_segment()? {
            write!(
                out,
                "{:04X} [FF {:02X}] ",
                segment.offset(),
                segment.marker(),
            )
            .unwrap();

            match segment.as_segment_kind() {
                Some(SegmentKind::Dqt(dqt)) => writeln!(out, "{dqt:?}").unwrap(),
                Some(SegmentKind::Dht(dht)) => writeln!(out, "{dht:?}").unwrap(),
                Some(SegmentKind::Dri(dri)) => writeln!(out, "{dri:?}").unwrap(),
                Some(SegmentKind::Sof(sof)) => writeln!(out, "{sof:?}").unwrap(),
                Some(SegmentKind::Sos(sos)) => writeln!(out, "{sos:?}").unwrap(),
                Some(SegmentKind::App(app)) if app.jfif().is_none() => {
                    // Dump the bytes of APP segments we don't decode.
                    writeln!(out, "{app:?} {:x?}", segment.raw_bytes()).unwrap();
                }
                Some(SegmentKind::App(app)) => writeln!(out, "{app:?}").unwrap(),
                None => writeln!(out, "{:x?}", segment.raw_bytes()).unwrap(),
            }
        }

        if !parser.remaining().is_empty() {
            writeln!(
                out,
                "{} trailing bytes: {:x?}",
                parser.remaining().len(),
                parser.remaining()
            )
            .unwrap();
        }
        Ok(())
    }

    let mut out = String::new();
    if let Err(e) = dump_impl(jpeg, &mut out) {
        writeln!(out, "error: {e}").unwrap();
    }

    out
}

fn check(jpeg: &[u8], expect: Expect) {
    expect.assert_eq(&dump(jpeg));
}

#[test]
fn empty() {
    check(
        &[0xFF],
        expect![[r#"
            error: reached end of data while decoding JPEG stream
        "#]],
    );
    check(
        &[0xFF, 0xD8 /* SOI */],
        expect![[r#"
            error: reached end of data while decoding JPEG stream
        "#]],
    );
    check(
        &[
            0xFF, 0xD8, // SOI
            0xFF, 0xD9, // EOI
        ],
        expect![[""]],
    );
    check(
        &[
            0xFF, 0xD8, // SOI
            0xFF, 0xD9, // EOI
            0xFF, // trailing
        ],
        expect![[r#"
            1 trailing bytes: [ff]
        "#]],
    );
    check(
        &[
            0xFF, 0xD8, // SOI
            0xFF, 0x00, // not a valid marker
        ],
        expect![[r#"
            error: invalid ff 00 marker
        "#]],
    );
    check(
        &[
            0xFF, 0xD8, // SOI
            0xFF, 0xDB, // DQT
            0x00, 0x43, // length runs past the end of the data
            0x00,
        ],
        expect![[r#"
            error: reached end of data while decoding JPEG stream
        "#]],
    );
}

#[test]
fn app() {
    check(
        &[
            0xFF, 0xD8, // SOI
            0xFF, 0xE0, // APP0
            0x00, 0x02, // empty
            0xFF, 0xD9, // EOI
        ],
        expect![[r#"
            0002 [FF E0] App { n: 0, jfif: None } []
        "#]],
    );
    check(
        &[
            0xFF, 0xD8, // SOI
            0xFF, 0xE0, // APP0
            0x00, 0x04, // 2 more bytes after this
            0x00, 0x00, // APP0 contents (non-JFIF)
            0xFF, 0xD9, // EOI
        ],
        expect![[r#"
            0002 [FF E0] App { n: 0, jfif: None } [0, 0]
        "#]],
    );
    check(
        &[
            0xFF, 0xD8, // SOI
            0xFF, 0xE1, // APP1
            0x00, 0x06, // 4 more bytes after this
            0x45, 0x78, 0x69, 0x66, // "Exif"
            0xFF, 0xD9, // EOI
        ],
        expect![[r#"
            0002 [FF E1] App { n: 1, jfif: None } [45, 78, 69, 66]
        "#]],
    );
}

#[test]
fn jfif() {
    check(
        &[
            0xFF, 0xD8, // SOI
            0xFF, 0xE0, // APP0
            0x00, 0x10, // length 16
            0x4A, 0x46, 0x49, 0x46, 0x00, // "JFIF\0"
            0x01, 0x02, // version 1.02
            0x00, // no density unit
            0x00, 0x48, // Xdensity
            0x00, 0x48, // Ydensity
            0x00, 0x00, // no thumbnail
            0xFF, 0xD9, // EOI
        ],
        expect![[r#"
            0002 [FF E0] App { n: 0, jfif: Some(Jfif { major_version: 1, minor_version: 2, unit: None, density_x: 72, density_y: 72 }) }
        "#]],
    );
    check(
        &[
            0xFF, 0xD8, // SOI
            0xFF, 0xE0, // APP0
            0x00, 0x10, // length 16
            0x4A, 0x46, 0x49, 0x46, 0x00, // "JFIF\0"
            0x01, 0x02, // version 1.02
            0x03, // invalid density unit
            0x00, 0x48, 0x00, 0x48, 0x00, 0x00, //
            0xFF, 0xD9, // EOI
        ],
        expect![[r#"
            error: JFIF header specifies invalid density unit 3
        "#]],
    );
}

#[test]
fn sof() {
    check(
        &[
            0xFF, 0xD8, // SOI
            0xFF, 0xC0, // SOF0
            0x00, 0x11, // length 17
            0x08, // precision
            0x00, 0x10, // height 16
            0x00, 0x10, // width 16
            0x03, // 3 components
            0x01, 0x22, 0x00, // Y, 2x2, qtable 0
            0x02, 0x11, 0x01, // Cb, 1x1, qtable 1
            0x03, 0x11, 0x01, // Cr, 1x1, qtable 1
            0xFF, 0xD9, // EOI
        ],
        expect![[r#"
            0002 [FF C0] Sof { marker: SOF0, precision: 8, height: 16, width: 16, components: [FrameComponent { id: 1, h: 2, v: 2, qtable: 0 }, FrameComponent { id: 2, h: 1, v: 1, qtable: 1 }, FrameComponent { id: 3, h: 1, v: 1, qtable: 1 }] }
        "#]],
    );
    // Non-baseline frames still parse; rejecting them is not this layer's
    // job.
    check(
        &[
            0xFF, 0xD8, // SOI
            0xFF, 0xC2, // SOF2 (progressive)
            0x00, 0x0B, // length 11
            0x08, // precision
            0x00, 0x08, // height 8
            0x00, 0x08, // width 8
            0x01, // 1 component
            0x01, 0x11, 0x00, //
            0xFF, 0xD9, // EOI
        ],
        expect![[r#"
            0002 [FF C2] Sof { marker: SOF2, precision: 8, height: 8, width: 8, components: [FrameComponent { id: 1, h: 1, v: 1, qtable: 0 }] }
        "#]],
    );
}

#[test]
fn dqt() {
    let mut jpeg = vec![
        0xFF, 0xD8, // SOI
        0xFF, 0xDB, // DQT
        0x00, 0x43, // length 67 (one 8-bit table)
        0x00, // Pq 0, Tq 0
    ];
    jpeg.extend(1..=64u8);
    jpeg.extend([0xFF, 0xD9]); // EOI
    check(
        &jpeg,
        expect![[r#"
            0002 [FF DB] Dqt([QuantizationTable { precision: 0, id: 0, values: [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48, 49, 50, 51, 52, 53, 54, 55, 56, 57, 58, 59, 60, 61, 62, 63, 64] }])
        "#]],
    );
}

#[test]
fn dht() {
    // Two table definitions packed into a single DHT segment.
    check(
        &[
            0xFF, 0xD8, // SOI
            0xFF, 0xC4, // DHT
            0x00, 0x27, // length 39
            0x00, // class 0 (DC), id 0
            0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // two 2-bit codes
            0x03, 0x05, // symbols
            0x10, // class 1 (AC), id 0
            0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // one 1-bit code
            0x00, // symbol
            0xFF, 0xD9, // EOI
        ],
        expect![[r#"
            0002 [FF C4] Dht { tables: [DhtTable { class: 0, id: 0, counts: [0, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], symbols: [3, 5] }, DhtTable { class: 1, id: 0, counts: [1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], symbols: [0] }] }
        "#]],
    );
}

#[test]
fn scan() {
    // The entropy-coded data (including stuffed bytes and RST markers)
    // follows the SOS header and is captured as part of the segment.
    check(
        &[
            0xFF, 0xD8, // SOI
            0xFF, 0xDA, // SOS
            0x00, 0x08, // length 8
            0x01, // 1 component
            0x01, 0x00, // selector 1, DC/AC tables 0
            0x00, 0x3F, 0x00, // Ss, Se, Ah/Al
            0xAB, 0xCD, // scan data
            0xFF, 0xD0, // RST0, part of the scan data
            0xEF, // more scan data
            0xFF, 0x00, // stuffed 0xFF, part of the scan data
            0xAA, // more scan data
            0xFF, 0xD9, // EOI
        ],
        expect![[r#"
            0002 [FF DA] Sos { components: [ScanComponent { selector: 1, dc_table: 0, ac_table: 0 }], spectral_start: 0, spectral_end: 63, approx: 0, data: <8 bytes> }
        "#]],
    );
}

#[test]
fn skips_unknown_segments() {
    check(
        &[
            0xFF, 0xD8, // SOI
            0xFF, 0xFE, // COM
            0x00, 0x04, // length 4
            0x68, 0x69, // "hi"
            0xFF, 0xDD, // DRI
            0x00, 0x04, // length 4
            0x00, 0x02, // Ri
            0xFF, 0xD9, // EOI
        ],
        expect![[r#"
            0002 [FF FE] [68, 69]
            0008 [FF DD] Dri { mcus: 2 }
        "#]],
    );
}
