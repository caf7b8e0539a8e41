use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame,
};

use crate::config::ColorConfig;
use crate::tui::app::{Focus, TuiApp};
use crate::view::{BookmarkView, Screen, EMPTY_MESSAGE};

const TITLE_PLACEHOLDER: &str = "Bookmark title";
const URL_PLACEHOLDER: &str = "https://example.com";

pub fn render(frame: &mut Frame, app: &mut TuiApp, view: &BookmarkView, colors: &ColorConfig) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(5),    // Main area
            Constraint::Length(1), // Status bar
        ])
        .split(frame.area());

    match view.screen() {
        Screen::SignedOut => render_signed_out(frame, view, chunks[0], colors),
        screen => render_signed_in(frame, app, view, screen, chunks[0], colors),
    }
    render_status_bar(frame, app, view, chunks[1], colors);

    if let Some(alert) = view.alert() {
        render_alert(frame, alert, colors);
    }
}

fn render_signed_out(frame: &mut Frame, view: &BookmarkView, area: Rect, colors: &ColorConfig) {
    let prompt = if view.sign_in_pending() {
        "Finish signing in in your browser...".to_string()
    } else {
        format!("[ Sign in with {} ]  press Enter", provider_label(view.provider()))
    };

    let text = Text::from(vec![
        Line::from(Span::styled(
            "Smart Bookmark Manager",
            Style::default()
                .fg(colors.heading)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from("Save and manage your personal bookmarks securely."),
        Line::from(""),
        Line::from(Span::styled(
            prompt,
            Style::default().fg(colors.active_border),
        )),
    ]);

    let inner = centered_rect(60, 7, area);
    let paragraph = Paragraph::new(text)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, inner);
}

fn render_signed_in(
    frame: &mut Frame,
    app: &mut TuiApp,
    view: &BookmarkView,
    screen: Screen<'_>,
    area: Rect,
    colors: &ColorConfig,
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Header
            Constraint::Length(4), // Form
            Constraint::Min(3),    // Bookmarks
        ])
        .split(area);

    render_header(frame, view, chunks[0], colors);
    render_form(frame, app, view, chunks[1], colors);
    render_bookmarks(frame, app, screen, chunks[2], colors);
}

fn render_header(frame: &mut Frame, view: &BookmarkView, area: Rect, colors: &ColorConfig) {
    let email = view.identity().map(|u| u.display_name()).unwrap_or_default();
    let header = Line::from(vec![
        Span::styled(
            format!("Welcome, {}", email),
            Style::default()
                .fg(colors.heading)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled("   L:Logout", Style::default().fg(colors.placeholder)),
    ]);
    frame.render_widget(Paragraph::new(header), area);
}

fn render_form(
    frame: &mut Frame,
    app: &TuiApp,
    view: &BookmarkView,
    area: Rect,
    colors: &ColorConfig,
) {
    let is_active = app.focus.is_input();
    let border_style = if is_active {
        Style::default().fg(colors.active_border)
    } else {
        Style::default().fg(colors.inactive_border)
    };
    let block = Block::default()
        .title(" Add New Bookmark ")
        .borders(Borders::ALL)
        .border_style(border_style);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let fields = [
        (Focus::Title, "Title ", view.title_input.as_str(), TITLE_PLACEHOLDER),
        (Focus::Url, "URL   ", view.url_input.as_str(), URL_PLACEHOLDER),
    ];
    for (row, (focus, label, value, placeholder)) in fields.into_iter().enumerate() {
        let y = inner.y + row as u16;
        if y >= inner.bottom() {
            break;
        }
        let line_area = Rect::new(inner.x, y, inner.width, 1);
        let focused = app.focus == focus;

        let label_style = if focused {
            Style::default()
                .fg(colors.active_border)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        let value_span = if value.is_empty() {
            Span::styled(placeholder, Style::default().fg(colors.placeholder))
        } else {
            Span::raw(value)
        };
        frame.render_widget(
            Paragraph::new(Line::from(vec![Span::styled(label, label_style), value_span])),
            line_area,
        );

        if focused && view.alert().is_none() {
            let x = line_area.x + label.len() as u16 + value.chars().count() as u16;
            frame.set_cursor_position((x.min(line_area.right().saturating_sub(1)), y));
        }
    }
}

fn render_bookmarks(
    frame: &mut Frame,
    app: &mut TuiApp,
    screen: Screen<'_>,
    area: Rect,
    colors: &ColorConfig,
) {
    let is_active = app.focus == Focus::List;
    let border_style = if is_active {
        Style::default().fg(colors.active_border)
    } else {
        Style::default().fg(colors.inactive_border)
    };

    let bookmarks = match screen {
        Screen::List(bookmarks) => bookmarks,
        _ => {
            let block = Block::default()
                .title(" Bookmarks ")
                .borders(Borders::ALL)
                .border_style(border_style);
            let paragraph = Paragraph::new(EMPTY_MESSAGE)
                .style(Style::default().fg(colors.placeholder))
                .alignment(Alignment::Center)
                .block(block);
            frame.render_widget(paragraph, area);
            return;
        }
    };

    let items: Vec<ListItem> = bookmarks
        .iter()
        .map(|bookmark| {
            ListItem::new(Text::from(vec![
                Line::from(Span::styled(
                    bookmark.title.clone(),
                    Style::default()
                        .fg(colors.bookmark_title)
                        .add_modifier(Modifier::BOLD),
                )),
                Line::from(Span::styled(
                    bookmark.url.clone(),
                    Style::default().fg(colors.bookmark_url),
                )),
            ]))
        })
        .collect();

    let title = format!(
        " Bookmarks ({}) [{}/{}] ",
        bookmarks.len(),
        app.selected + 1,
        bookmarks.len()
    );
    let highlight_style = if is_active {
        Style::default()
            .bg(colors.selection_bg)
            .fg(colors.selection_fg)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(border_style);

    let list = List::new(items)
        .block(block)
        .highlight_style(highlight_style)
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut app.list_state);
}

fn render_status_bar(
    frame: &mut Frame,
    app: &TuiApp,
    view: &BookmarkView,
    area: Rect,
    colors: &ColorConfig,
) {
    let status = if let Some((_, ref title)) = app.pending_delete {
        format!("Delete \"{}\"? (y/n)", title)
    } else if let Some(ref msg) = app.status_message {
        msg.clone()
    } else if view.identity().is_none() {
        "Enter:Sign in  q:Quit".to_string()
    } else if app.focus.is_input() {
        "Tab:Next field  Enter:Add  Esc:List  Ctrl+c:Quit".to_string()
    } else {
        "j/k:Nav  Tab:Form  o:Open  d:Delete  R:Refresh  L:Logout  q:Quit".to_string()
    };
    let status = if view.identity().is_some() && !view.is_subscribed() {
        format!("{}  [live updates off]", status)
    } else {
        status
    };

    let paragraph =
        Paragraph::new(status).style(Style::default().fg(colors.status_fg).bg(colors.status_bg));

    frame.render_widget(paragraph, area);
}

fn render_alert(frame: &mut Frame, message: &str, colors: &ColorConfig) {
    let area = centered_rect(50, 5, frame.area());
    let block = Block::default()
        .title(" Alert ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(colors.alert_border));
    let text = Text::from(vec![
        Line::from(message.to_string()),
        Line::from(""),
        Line::from(Span::styled(
            "Press any key",
            Style::default().fg(colors.placeholder),
        )),
    ]);
    let paragraph = Paragraph::new(text)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(block);

    frame.render_widget(Clear, area);
    frame.render_widget(paragraph, area);
}

/// A rect `percent_x` wide and `height` rows tall in the middle of `area`.
fn centered_rect(percent_x: u16, height: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(height),
            Constraint::Fill(1),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

fn provider_label(provider: &str) -> String {
    let mut chars = provider.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
