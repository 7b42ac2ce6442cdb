// ==========================================
// 商品导入系统 - 行数据源
// ==========================================
// 职责: 文件校验、内容摘要、按块读取源数据行
// 支持: CSV（流式转码）/ Excel (.xlsx/.xls)
// 约束: 每次只读取一个块, 内存占用与文件大小无关（Excel 由 calamine 整表加载）
// ==========================================

use crate::config::ImportSettings;
use crate::importer::dialect::{disambiguate_headers, Dialect, DialectAnalyzer};
use crate::importer::error::{ImportError, ImportResult};
use calamine::{open_workbook_auto, Data, Range, Reader};
use csv::{ReaderBuilder, StringRecord};
use encoding_rs::Decoder;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

// ==========================================
// 文件校验
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Csv,
    Excel,
}

impl FileKind {
    pub fn from_path(path: &Path) -> ImportResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        match ext.as_str() {
            "csv" => Ok(FileKind::Csv),
            "xlsx" | "xls" => Ok(FileKind::Excel),
            _ => Err(ImportError::UnsupportedFormat(ext)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileInfo {
    pub path: PathBuf,
    pub file_name: String,
    pub kind: FileKind,
    pub size: u64,
}

/// 文件校验: 存在、非空、扩展名受支持、不超过大小上限
pub fn validate_file(path: &Path, max_size: u64) -> ImportResult<FileInfo> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }
    let kind = FileKind::from_path(path)?;
    let size = std::fs::metadata(path)?.len();
    if size == 0 {
        return Err(ImportError::EmptyFile(path.display().to_string()));
    }
    if size > max_size {
        return Err(ImportError::FileTooLarge {
            size,
            limit: max_size,
        });
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    Ok(FileInfo {
        path: path.to_path_buf(),
        file_name,
        kind,
        size,
    })
}

/// 文件内容 SHA-256（十六进制）
pub fn compute_sha256(path: &Path) -> ImportResult<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

// ==========================================
// RowSource Trait
// ==========================================

/// 单个源数据行
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    /// 源文件中的行号（从 1 开始）
    pub line: usize,
    /// 表头 → 去除首尾空白的原始值
    pub fields: HashMap<String, String>,
}

pub trait RowSource: Send {
    fn headers(&self) -> &[String];

    /// 读取至多 max 行; 返回空列表表示数据已读完
    fn next_chunk(&mut self, max: usize) -> ImportResult<Vec<SourceRow>>;
}

/// 按位置把字段映射到表头; 多余的单元格丢弃, 缺失的单元格不出现; 全空行返回 None
fn map_to_headers<'a, I>(headers: &[String], values: I, line: usize) -> Option<SourceRow>
where
    I: Iterator<Item = &'a str>,
{
    let mut fields = HashMap::with_capacity(headers.len());
    let mut blank = true;
    for (header, value) in headers.iter().zip(values) {
        let value = value.trim();
        if !value.is_empty() {
            blank = false;
        }
        fields.insert(header.clone(), value.to_string());
    }
    (!blank).then_some(SourceRow { line, fields })
}

/// 识别方言并打开对应的行数据源
pub fn open_row_source(
    info: &FileInfo,
    settings: &ImportSettings,
) -> ImportResult<(Dialect, Box<dyn RowSource>)> {
    match info.kind {
        FileKind::Csv => {
            let mut file = File::open(&info.path)?;
            let dialect = DialectAnalyzer::from_settings(settings).analyze(&mut file, settings)?;
            let source = CsvRowSource::from_reader(file, &dialect, settings)?;
            Ok((dialect, Box::new(source)))
        }
        FileKind::Excel => {
            let source = ExcelRowSource::open(&info.path, settings)?;
            let dialect = Dialect::workbook(
                source.headers().to_vec(),
                source.remaining_rows() as u64,
                info.size,
            );
            Ok((dialect, Box::new(source)))
        }
    }
}

// ==========================================
// TranscodingReader - 流式转码为 UTF-8
// ==========================================
pub struct TranscodingReader<R> {
    inner: R,
    decoder: Decoder,
    in_buf: Vec<u8>,
    out_buf: Vec<u8>,
    out_pos: usize,
    finished: bool,
}

impl<R: Read> TranscodingReader<R> {
    /// 解码器带 BOM 嗅探（BOM 不会进入输出）
    pub fn new(inner: R, encoding: &'static encoding_rs::Encoding) -> Self {
        Self {
            inner,
            decoder: encoding.new_decoder(),
            in_buf: vec![0; 8 * 1024],
            out_buf: Vec::new(),
            out_pos: 0,
            finished: false,
        }
    }
}

impl<R: Read> Read for TranscodingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.out_pos < self.out_buf.len() {
                let n = buf.len().min(self.out_buf.len() - self.out_pos);
                buf[..n].copy_from_slice(&self.out_buf[self.out_pos..self.out_pos + n]);
                self.out_pos += n;
                return Ok(n);
            }
            if self.finished {
                return Ok(0);
            }

            let n = self.inner.read(&mut self.in_buf)?;
            let last = n == 0;
            let capacity = self
                .decoder
                .max_utf8_buffer_length(n)
                .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "转码缓冲区长度溢出"))?;
            self.out_buf.resize(capacity, 0);
            let (_, _, written, _) =
                self.decoder
                    .decode_to_utf8(&self.in_buf[..n], &mut self.out_buf, last);
            self.out_buf.truncate(written);
            self.out_pos = 0;
            self.finished = last;
        }
    }
}

// ==========================================
// LineTrackingReader - 物理行号
// ==========================================
// csv 的 Position::line 不计跳过的空行, 这里按换行符的字节偏移自行计数
// 只保留尚未被记录起点越过的换行偏移, 占用与读缓冲同量级
pub struct LineTrackingReader<R> {
    inner: R,
    offset: u64,
    pending_newlines: VecDeque<u64>,
    lines_before: usize,
}

impl<R> LineTrackingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            offset: 0,
            pending_newlines: VecDeque::new(),
            lines_before: 0,
        }
    }

    /// 起始于 byte 偏移的记录所在的物理行号（从 1 开始）
    ///
    /// 调用方须按非递减的偏移顺序查询
    pub fn line_at(&mut self, byte: u64) -> usize {
        while let Some(&newline) = self.pending_newlines.front() {
            if newline >= byte {
                break;
            }
            self.pending_newlines.pop_front();
            self.lines_before += 1;
        }
        self.lines_before + 1
    }
}

impl<R: Read> Read for LineTrackingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        for (i, b) in buf[..n].iter().enumerate() {
            if *b == b'\n' {
                self.pending_newlines.push_back(self.offset + i as u64);
            }
        }
        self.offset += n as u64;
        Ok(n)
    }
}

// ==========================================
// CsvRowSource
// ==========================================
type CsvInput = LineTrackingReader<TranscodingReader<BufReader<File>>>;

pub struct CsvRowSource {
    headers: Vec<String>,
    reader: csv::Reader<CsvInput>,
    record: StringRecord,
    /// 已读取的记录序号（空行不计）
    next_index: usize,
    data_start: usize,
}

impl CsvRowSource {
    /// 按方言打开 CSV 数据流
    pub fn open(path: &Path, dialect: &Dialect, settings: &ImportSettings) -> ImportResult<Self> {
        Self::from_reader(File::open(path)?, dialect, settings)
    }

    fn from_reader(file: File, dialect: &Dialect, settings: &ImportSettings) -> ImportResult<Self> {
        let delimiter = ascii_byte("delimiter", dialect.delimiter)?;
        let quote = ascii_byte("quote_char", dialect.quote_char)?;
        let escape = if dialect.uses_doubled_quote() {
            None
        } else {
            Some(ascii_byte("escape_char", dialect.escape_char)?)
        };

        let input = LineTrackingReader::new(TranscodingReader::new(
            BufReader::new(file),
            dialect.encoding(),
        ));
        let reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .quote(quote)
            .escape(escape)
            .double_quote(true)
            .flexible(true) // 允许行长度不一致
            .has_headers(false)
            .from_reader(input);

        // 无表头时首个记录即数据
        let data_start = if dialect.has_header {
            settings.effective_data_start_row()
        } else {
            settings.header_row
        };

        Ok(Self {
            headers: dialect.headers.clone(),
            reader,
            record: StringRecord::new(),
            next_index: 0,
            data_start,
        })
    }
}

fn ascii_byte(name: &str, c: char) -> ImportResult<u8> {
    if c.is_ascii() {
        Ok(c as u8)
    } else {
        Err(ImportError::DialectError(format!(
            "{} 必须为 ASCII 字符: {:?}",
            name, c
        )))
    }
}

impl RowSource for CsvRowSource {
    fn headers(&self) -> &[String] {
        &self.headers
    }

    fn next_chunk(&mut self, max: usize) -> ImportResult<Vec<SourceRow>> {
        let mut rows = Vec::with_capacity(max);
        while rows.len() < max {
            if !self.reader.read_record(&mut self.record)? {
                break;
            }
            let index = self.next_index;
            self.next_index += 1;
            if index < self.data_start {
                continue;
            }

            let line = match self.record.position() {
                Some(pos) => self.reader.get_mut().line_at(pos.byte()),
                None => index + 1,
            };
            // 跳过完全空白的行
            if let Some(row) = map_to_headers(&self.headers, self.record.iter(), line) {
                rows.push(row);
            }
        }
        debug!(rows = rows.len(), "CSV 块读取完成");
        Ok(rows)
    }
}

// ==========================================
// ExcelRowSource
// ==========================================
pub struct ExcelRowSource {
    headers: Vec<String>,
    range: Range<Data>,
    next_row: usize,
}

impl ExcelRowSource {
    /// 打开首个工作表, 表头取 header_row 行
    pub fn open(path: &Path, settings: &ImportSettings) -> ImportResult<Self> {
        let mut workbook = open_workbook_auto(path)?;
        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ImportError::ExcelParseError("Excel 文件无工作表".to_string()))?;
        let range = workbook.worksheet_range(&sheet_name)?;

        if range.height() <= settings.header_row {
            return Err(ImportError::EmptyFile(format!(
                "empty or unreadable file: 工作表 {} 无表头行",
                sheet_name
            )));
        }

        let headers: Vec<String> = (0..range.width())
            .map(|col| cell_text(range.get((settings.header_row, col))))
            .collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(ImportError::DialectError(format!(
                "工作表 {} 的表头行为空",
                sheet_name
            )));
        }

        let (headers, renamed) = disambiguate_headers(headers);
        for w in &renamed {
            warn!(sheet = %sheet_name, warning = %w, "Excel 表头告警");
        }

        debug!(sheet = %sheet_name, rows = range.height(), columns = headers.len(), "Excel 工作表已加载");
        Ok(Self {
            headers,
            next_row: settings.effective_data_start_row(),
            range,
        })
    }

    pub fn remaining_rows(&self) -> usize {
        self.range.height().saturating_sub(self.next_row)
    }
}

fn cell_text(cell: Option<&Data>) -> String {
    match cell {
        None | Some(Data::Empty) => String::new(),
        Some(value) => value.to_string().trim().to_string(),
    }
}

impl RowSource for ExcelRowSource {
    fn headers(&self) -> &[String] {
        &self.headers
    }

    fn next_chunk(&mut self, max: usize) -> ImportResult<Vec<SourceRow>> {
        let mut rows = Vec::with_capacity(max);
        while rows.len() < max && self.next_row < self.range.height() {
            let row_idx = self.next_row;
            self.next_row += 1;

            let values: Vec<String> = (0..self.headers.len())
                .map(|col| cell_text(self.range.get((row_idx, col))))
                .collect();
            if let Some(row) = map_to_headers(&self.headers, values.iter().map(String::as_str), row_idx + 1)
            {
                rows.push(row);
            }
        }
        Ok(rows)
    }
}
