use accbin::doctest_utils::{raw_sample, BinFixture};
use accbin::{
    read_bin, AccReader, AccessMode, BinError, BinRead, ManualCalibration, ReadOptions, WindowSpec,
};
use std::fs;
use std::path::Path;

// 清理测试文件的辅助函数
fn cleanup_test_file(filename: &str) {
    if Path::new(filename).exists() {
        fs::remove_file(filename).ok();
    }
}

// 2012-02-01 00:00:00 UTC
const START: f64 = 1_328_054_400.0;

fn header_calibration() -> ManualCalibration {
    ManualCalibration {
        gain: vec![25548.0, 26242.0, 25836.0],
        offset: vec![-2425.0, 1136.0, -1032.0],
        volts: 300.0,
        lux: 800.0,
    }
}

#[test]
fn test_header_and_calibration_constants() {
    let filename = "test_header_constants.bin";
    BinFixture::new().pages(4).write(filename).unwrap();

    let reader = AccReader::open(filename).unwrap();
    let header = reader.header();
    assert_eq!(header.serial_number(), Some("012345"));
    assert_eq!(header.device_location(), Some("left wrist"));
    assert_eq!(header.get_in("Trial Info", "Study_Code"), Some("ST01"));
    assert_eq!(header.decimal_separator, '.');

    let calib = reader.calibration();
    assert_eq!((calib.x_gain, calib.x_offset), (25548, -2425));
    assert_eq!((calib.y_gain, calib.y_offset), (26242, 1136));
    assert_eq!((calib.z_gain, calib.z_offset), (25836, -1032));
    assert_eq!(calib.volts, 300.0);
    assert_eq!(calib.lux, 800.0);
    assert_eq!(calib.page_count, 4);
    assert_eq!(calib.sampling_frequency, 100.0);
    assert_eq!(calib.start_calendar_epoch, START);
    assert_eq!(calib.start_seconds_of_day, 0.0);
    assert!(calib.supports_random_access());

    cleanup_test_file(filename);
}

#[test]
fn test_full_read_row_count_and_timestamps() {
    let filename = "test_full_read.bin";
    BinFixture::new().pages(5).write(filename).unwrap();

    let reader = AccReader::open(filename).unwrap();
    let data = reader.read(&ReadOptions::new()).unwrap();

    assert_eq!(data.len(), 5 * 300);
    assert_eq!(data.page_timestamps.len(), 5);
    assert!(data.warnings.is_empty());
    assert_eq!(data.frequency, 100.0);

    // 每页第一个样本的时间等于页时间
    for (i, page_time) in data.page_timestamps.iter().enumerate() {
        assert_eq!(*page_time, START + i as f64 * 3.0);
        assert_eq!(data.data.timestamp[i * 300], *page_time);
    }
    assert!(data.data.timestamp.windows(2).all(|w| w[0] < w[1]));

    cleanup_test_file(filename);
}

#[test]
fn test_page_window_row_count() {
    let filename = "test_page_window.bin";
    BinFixture::new().pages(8).write(filename).unwrap();

    let reader = AccReader::open(filename).unwrap();
    for (a, b) in [(1usize, 1usize), (2, 5), (3, 8), (8, 8)] {
        let data = reader
            .read(&ReadOptions::new().with_start(a).with_end(b))
            .unwrap();
        assert_eq!(data.len(), (b - a + 1) * 300, "pages {}..={}", a, b);
        assert_eq!(data.window.start_page, a);
        assert_eq!(data.page_timestamps[0], START + (a - 1) as f64 * 3.0);
    }

    // 结束页超出范围时截断
    let data = reader
        .read(&ReadOptions::new().with_start(7usize).with_end(100usize))
        .unwrap();
    assert_eq!(data.window.end_page, 8);
    assert_eq!(data.len(), 600);

    let data = reader
        .read(&ReadOptions::new().with_start(3usize).with_length(2))
        .unwrap();
    assert_eq!((data.window.start_page, data.window.end_page), (3, 4));

    cleanup_test_file(filename);
}

#[test]
fn test_proportion_window() {
    let filename = "test_proportion_window.bin";
    BinFixture::new().pages(10).write(filename).unwrap();

    let reader = AccReader::open(filename).unwrap();
    let data = reader
        .read(&ReadOptions::new().with_start("0.5").with_end("1"))
        .unwrap();
    assert_eq!(data.window.start_page, 5);
    assert_eq!(data.window.end_page, 10);
    assert_eq!(data.len(), 6 * 300);

    let data = reader
        .read(&ReadOptions::new().with_start(WindowSpec::Proportion(0.0)).with_end("0.25"))
        .unwrap();
    assert_eq!((data.window.start_page, data.window.end_page), (1, 3));

    cleanup_test_file(filename);
}

#[test]
fn test_numeric_one_start_is_first_page() {
    let filename = "test_numeric_one_start.bin";
    BinFixture::new().pages(4).write(filename).unwrap();

    let reader = AccReader::open(filename).unwrap();

    // 起点 "1" 是第一页，不是比例
    let data = reader.read(&ReadOptions::new().with_start("1")).unwrap();
    assert_eq!((data.window.start_page, data.window.end_page), (1, 4));
    assert_eq!(data.len(), 4 * 300);

    // 终点 "1" 仍表示整段记录
    let data = reader
        .read(&ReadOptions::new().with_start("1").with_end("1"))
        .unwrap();
    assert_eq!((data.window.start_page, data.window.end_page), (1, 4));

    let data = reader
        .read(&ReadOptions::new().with_start("2").with_end("3"))
        .unwrap();
    assert_eq!((data.window.start_page, data.window.end_page), (2, 3));

    cleanup_test_file(filename);
}

#[test]
fn test_time_string_selects_whole_page() {
    let filename = "test_time_string_window.bin";
    BinFixture::new().pages(3).write(filename).unwrap();

    let reader = AccReader::open(filename).unwrap();
    let data = reader
        .read(&ReadOptions::new().with_start("00:00:01").with_end("00:00:02"))
        .unwrap();

    // 页粒度，不裁剪
    assert_eq!(data.len(), 300);
    assert_eq!(data.window.start_page, 1);
    assert_eq!(data.data.timestamp[0], START);

    let data = reader
        .read(&ReadOptions::new().with_start("00:00:04").with_end("00:00:07"))
        .unwrap();
    assert_eq!((data.window.start_page, data.window.end_page), (2, 3));

    cleanup_test_file(filename);
}

#[test]
fn test_timestamp_window_trims_rows() {
    let filename = "test_timestamp_trim.bin";
    BinFixture::new().pages(3).write(filename).unwrap();

    let reader = AccReader::open(filename).unwrap();
    let start = START + 3.5;
    let end = START + 4.0;
    let data = reader
        .read(
            &ReadOptions::new()
                .with_start(WindowSpec::Timestamp(start))
                .with_end(WindowSpec::Timestamp(end)),
        )
        .unwrap();

    assert_eq!(data.window.start_page, 2);
    assert_eq!(data.window.end_page, 2);
    assert!(data.len() >= 50 && data.len() <= 51, "rows: {}", data.len());
    assert!(data.data.timestamp.iter().all(|&t| t >= start && t <= end));

    cleanup_test_file(filename);
}

#[test]
fn test_calibrated_values() {
    let filename = "test_calibrated_values.bin";
    BinFixture::new().pages(2).write(filename).unwrap();

    let reader = AccReader::open(filename).unwrap();
    let data = reader.read(&ReadOptions::new()).unwrap();

    for i in [0usize, 1, 299, 300, 599] {
        let [x, y, z, light, button] = raw_sample(i);
        let row = data.data.row(i).unwrap();
        assert!((row.x - (x as f64 * 100.0 + 2425.0) / 25548.0).abs() < 1e-12);
        assert!((row.y - (y as f64 * 100.0 - 1136.0) / 26242.0).abs() < 1e-12);
        assert!((row.z - (z as f64 * 100.0 + 1032.0) / 25836.0).abs() < 1e-12);
        assert!((row.light - light as f64 * 800.0 / 300.0).abs() < 1e-9);
        assert_eq!(row.button as i32, button);
    }

    cleanup_test_file(filename);
}

#[test]
fn test_uncalibrated_values_are_raw() {
    let filename = "test_uncalibrated.bin";
    BinFixture::new().pages(2).write(filename).unwrap();

    let reader = AccReader::open(filename).unwrap();
    let data = reader.read(&ReadOptions::new().uncalibrated()).unwrap();

    for (i, row) in data.data.rows().enumerate() {
        let [x, y, z, light, button] = raw_sample(i);
        assert_eq!(row.x, x as f64);
        assert_eq!(row.y, y as f64);
        assert_eq!(row.z, z as f64);
        assert_eq!(row.light, light as f64);
        assert_eq!(row.button as i32, button);
    }
    // 负值经过二进制补码转换
    assert!(data.data.x.iter().any(|&x| x < 0.0));

    cleanup_test_file(filename);
}

#[test]
fn test_manual_calibration_matches_header() {
    let filename = "test_manual_calibration.bin";
    BinFixture::new().pages(2).write(filename).unwrap();

    let reader = AccReader::open(filename).unwrap();
    let from_header = reader.read(&ReadOptions::new()).unwrap();
    let manual = reader
        .read(&ReadOptions::new().with_calibration(header_calibration()))
        .unwrap();
    assert_eq!(from_header.data, manual.data);

    // 重复读取结果不变
    let again = reader
        .read(&ReadOptions::new().with_calibration(header_calibration()))
        .unwrap();
    assert_eq!(manual.data, again.data);

    let doubled = ManualCalibration {
        gain: vec![25548.0 * 2.0, 26242.0 * 2.0, 25836.0 * 2.0],
        ..header_calibration()
    };
    let halved = reader.read(&ReadOptions::new().with_calibration(doubled)).unwrap();
    assert!((halved.data.x[5] * 2.0 - from_header.data.x[5]).abs() < 1e-12);

    cleanup_test_file(filename);
}

#[test]
fn test_invalid_calibration_rejected_before_reading() {
    let bad = ManualCalibration {
        gain: vec![1.0, 1.0],
        ..header_calibration()
    };
    // 文件不存在，但参数错误先被报告
    let err = read_bin(
        "test_does_not_exist.bin",
        &ReadOptions::new().with_calibration(bad),
    )
    .unwrap_err();
    assert!(matches!(err, BinError::CalibrationInput(_)));

    let zero_volts = ManualCalibration { volts: 0.0, ..header_calibration() };
    let err = read_bin(
        "test_does_not_exist.bin",
        &ReadOptions::new().with_calibration(zero_volts),
    )
    .unwrap_err();
    assert!(matches!(err, BinError::CalibrationInput(_)));
}

#[test]
fn test_temperature_and_voltage_columns() {
    let filename = "test_temperature_voltage.bin";
    BinFixture::new().pages(3).write(filename).unwrap();

    let reader = AccReader::open(filename).unwrap();
    let data = reader
        .read(&ReadOptions::new().with_temperature(true).with_voltage(true))
        .unwrap();

    let temperature = data.data.temperature.as_ref().unwrap();
    assert_eq!(temperature.len(), data.len());
    for page in 1..=3 {
        assert_eq!(temperature[(page - 1) * 300], BinFixture::temperature(page));
        assert_eq!(temperature[page * 300 - 1], BinFixture::temperature(page));
    }

    let voltages = data.page_voltages.as_ref().unwrap();
    assert_eq!(voltages.len(), 3);
    for (i, v) in voltages.iter().enumerate() {
        assert!((v - BinFixture::voltage(i + 1)).abs() < 1e-9);
    }

    let plain = reader.read(&ReadOptions::new()).unwrap();
    assert!(plain.data.temperature.is_none());
    assert!(plain.page_voltages.is_none());

    cleanup_test_file(filename);
}

#[test]
fn test_comma_decimal_separator() {
    let filename = "test_comma_decimals.bin";
    BinFixture::new().pages(2).comma_decimals().write(filename).unwrap();

    let reader = AccReader::open(filename).unwrap();
    assert_eq!(reader.header().decimal_separator, ',');
    assert_eq!(reader.calibration().volts, 300.0);
    assert_eq!(reader.calibration().sampling_frequency, 100.0);

    let data = reader.read(&ReadOptions::new().with_temperature(true)).unwrap();
    assert_eq!(data.len(), 600);
    assert_eq!(data.data.temperature.as_ref().unwrap()[0], BinFixture::temperature(1));

    cleanup_test_file(filename);
}

#[test]
fn test_time_zone_shifts_timestamps() {
    let filename = "test_time_zone.bin";
    BinFixture::new().pages(2).time_zone("GMT +01:00").write(filename).unwrap();

    let reader = AccReader::open(filename).unwrap();
    assert_eq!(reader.calibration().start_calendar_epoch, START - 3600.0);

    // 时间字符串按记录所在时区解释
    let data = reader
        .read(&ReadOptions::new().with_start("00:00:04"))
        .unwrap();
    assert_eq!(data.window.start_page, 2);

    cleanup_test_file(filename);
}

#[test]
fn test_window_errors() {
    let filename = "test_window_errors.bin";
    BinFixture::new().pages(5).write(filename).unwrap();

    let reader = AccReader::open(filename).unwrap();

    let err = reader.read(&ReadOptions::new().with_start(9usize)).unwrap_err();
    assert!(matches!(err, BinError::StartOutOfRange { start: 9, page_count: 5 }));

    let err = reader
        .read(&ReadOptions::new().with_start(4usize).with_end(2usize))
        .unwrap_err();
    assert!(matches!(err, BinError::NoMatchingPages(_)));

    let err = reader.read(&ReadOptions::new().with_start("23:00")).unwrap_err();
    match err {
        BinError::NoMatchingPages(detail) => assert!(detail.contains("2012-02-01")),
        other => panic!("unexpected error: {:?}", other),
    }

    let err = reader.read(&ReadOptions::new().with_start("not a time")).unwrap_err();
    assert!(matches!(err, BinError::InvalidTime(_)));

    cleanup_test_file(filename);
}

#[test]
fn test_invalid_options() {
    let filename = "test_invalid_options.bin";
    BinFixture::new().pages(3).write(filename).unwrap();

    let reader = AccReader::open(filename).unwrap();
    let err = reader
        .read(&ReadOptions::new().with_downsample(accbin::Downsample::new(0)))
        .unwrap_err();
    assert!(matches!(err, BinError::InvalidOption(_)));

    let err = reader.read(&ReadOptions::new().with_blocksize(0)).unwrap_err();
    assert!(matches!(err, BinError::InvalidOption(_)));

    let err = reader
        .read(&ReadOptions::new().with_page_offsets(vec![100, 50, 200]))
        .unwrap_err();
    assert!(matches!(err, BinError::InvalidOption(_)));

    cleanup_test_file(filename);
}

#[test]
fn test_missing_file_and_sections() {
    let err = AccReader::open("test_no_such_file.bin").unwrap_err();
    assert!(matches!(err, BinError::FileNotFound(_)));

    let filename = "test_missing_section.bin";
    let text = BinFixture::new().pages(2).render().replace("Memory Status", "Memory Report");
    fs::write(filename, text).unwrap();

    let err = AccReader::open(filename).unwrap_err();
    assert!(matches!(err, BinError::MissingSection("Memory Status")));

    cleanup_test_file(filename);
}

#[test]
fn test_read_bin_returns_data() {
    let filename = "test_read_bin_data.bin";
    BinFixture::new().pages(2).write(filename).unwrap();

    match read_bin(filename, &ReadOptions::new().with_access_mode(AccessMode::Sequential)).unwrap() {
        BinRead::Data(data) => assert_eq!(data.len(), 600),
        BinRead::Virtual(_) => panic!("expected decoded data"),
    }

    cleanup_test_file(filename);
}
