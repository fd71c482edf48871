/// Render rows as a bordered text table.
///
/// ```text
/// +----+----------+
/// | ID | Username |
/// +----+----------+
/// | 1  | alice    |
/// +----+----------+
/// ```
pub fn render(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(widths.len()) {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let border = {
        let mut line = String::from("+");
        for w in &widths {
            line.push_str(&"-".repeat(w + 2));
            line.push('+');
        }
        line
    };

    let mut out = vec![
        border.clone(),
        format_row(&widths, headers.iter().copied()),
        border.clone(),
    ];
    for row in rows {
        out.push(format_row(&widths, row.iter().map(String::as_str)));
    }
    if !rows.is_empty() {
        out.push(border);
    }
    out.join("\n")
}

fn format_row<'a>(widths: &[usize], mut cells: impl Iterator<Item = &'a str>) -> String {
    let mut line = String::from("|");
    for w in widths {
        let cell = cells.next().unwrap_or("");
        let pad = w - cell.chars().count().min(*w);
        line.push(' ');
        line.push_str(cell);
        line.push_str(&" ".repeat(pad + 1));
        line.push('|');
    }
    line
}
