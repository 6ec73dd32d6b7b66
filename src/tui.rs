use std::io;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table};
use ratatui::Terminal;

use crate::backtest::{self, BacktestReport};
use crate::classifier::PriceFilter;
use crate::config::EngineConfig;
use crate::types::{ActivityLevel, Analysis, SignalCategory};
use crate::views::{self, ChartPoint, DateSelection, MarketOverview, ScreenerHit, ScreenerQuery};

struct App {
    analysis: Analysis,
    config: EngineConfig,
    category: SignalCategory,
    price: PriceFilter,
    overview: Option<MarketOverview>,
    hits: Vec<ScreenerHit>,
    chart: Vec<ChartPoint>,
    backtest: Option<BacktestReport>,
    selected: usize,
    should_quit: bool,
}

impl App {
    fn new(analysis: Analysis, config: EngineConfig, category: SignalCategory) -> Self {
        let overview = views::market_overview(&analysis, None).found();
        let mut app = Self {
            analysis,
            config,
            category,
            price: PriceFilter::Any,
            overview,
            hits: Vec::new(),
            chart: Vec::new(),
            backtest: None,
            selected: 0,
            should_quit: false,
        };
        app.refresh();
        app
    }

    /// Re-screens the whole history with the current category and price
    /// filter, newest first.
    fn refresh(&mut self) {
        let query = ScreenerQuery {
            dates: DateSelection::Range { from: chrono::NaiveDate::MIN, to: chrono::NaiveDate::MAX },
            price: self.price,
            ..ScreenerQuery::new(self.category)
        };
        self.hits = views::screener(&self.analysis, &query, &self.config).found().unwrap_or_default();
        self.hits.sort_by(|a, b| b.trading_date.cmp(&a.trading_date).then_with(|| b.conviction_score.total_cmp(&a.conviction_score)));
        self.backtest = backtest::run_with_config(&self.analysis, self.category, &self.config.backtest).found();
        self.selected = 0;
        self.load_chart();
    }

    fn load_chart(&mut self) {
        self.chart = match self.hits.get(self.selected) {
            Some(hit) => views::chart(&self.analysis, &hit.instrument_id, None, Some(hit.trading_date), &self.config)
                .found()
                .unwrap_or_default(),
            None => Vec::new(),
        };
    }

    fn select(&mut self, delta: isize) {
        if self.hits.is_empty() {
            return;
        }
        let next = self.selected.saturating_add_signed(delta).min(self.hits.len() - 1);
        if next != self.selected {
            self.selected = next;
            self.load_chart();
        }
    }

    fn next_price_filter(&mut self) {
        self.price = match self.price {
            PriceFilter::Any => PriceFilter::Sideways,
            PriceFilter::Sideways => PriceFilter::Downtrend,
            PriceFilter::Downtrend => PriceFilter::EarlyUptrend,
            PriceFilter::EarlyUptrend => PriceFilter::Any,
        };
        self.refresh();
    }

    fn set_category(&mut self, category: SignalCategory) {
        if self.category != category {
            self.category = category;
            self.refresh();
        }
    }
}

pub fn run(analysis: Analysis, config: EngineConfig, category: SignalCategory) -> Result<(), Box<dyn std::error::Error>> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let category = match category {
        SignalCategory::Normal => SignalCategory::Whale,
        c => c,
    };
    let result = run_app(&mut terminal, App::new(analysis, config, category));

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    mut app: App,
) -> Result<(), Box<dyn std::error::Error>> {
    while !app.should_quit {
        terminal.draw(|f| draw(f, &app))?;

        if event::poll(Duration::from_millis(250))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => app.should_quit = true,
                        KeyCode::Char('w') => app.set_category(SignalCategory::Whale),
                        KeyCode::Char('s') => app.set_category(SignalCategory::Split),
                        KeyCode::Char('p') => app.next_price_filter(),
                        KeyCode::Up => app.select(-1),
                        KeyCode::Down => app.select(1),
                        KeyCode::PageUp => app.select(-10),
                        KeyCode::PageDown => app.select(10),
                        _ => {}
                    }
                }
            }
        }
    }
    Ok(())
}

fn category_color(category: SignalCategory) -> Color {
    match category {
        SignalCategory::Whale => Color::Green,
        SignalCategory::Split => Color::Red,
        SignalCategory::Normal => Color::DarkGray,
    }
}

fn activity_color(activity: ActivityLevel) -> Color {
    match activity {
        ActivityLevel::Extreme => Color::Magenta,
        ActivityLevel::High => Color::Yellow,
        ActivityLevel::Medium => Color::Cyan,
        ActivityLevel::Normal => Color::DarkGray,
    }
}

fn draw(f: &mut ratatui::Frame, app: &App) {
    let size = f.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),  // header
            Constraint::Min(10),    // screener + chart
            Constraint::Length(7),  // backtest
        ])
        .split(size);

    draw_header(f, app, chunks[0]);

    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(chunks[1]);
    draw_screener(f, app, middle[0]);
    draw_chart(f, app, middle[1]);

    draw_backtest(f, app, chunks[2]);
}

fn draw_header(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let mut header = vec![
        Span::styled(" order-flow-radar ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw(" | "),
        Span::styled(
            app.category.label(),
            Style::default().fg(category_color(app.category)).add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | "),
        Span::styled(format!("Price: {:?}", app.price), Style::default().fg(Color::Yellow)),
        Span::raw(" | "),
    ];
    if let Some(o) = &app.overview {
        header.push(Span::raw(format!(
            "{}: {} instruments, {} whale, {} split",
            o.trading_date, o.instruments, o.whales, o.splits
        )));
        header.push(Span::raw(" | "));
    }
    header.push(Span::styled(
        "q=quit  w/s=category  p=price  Up/Down=select",
        Style::default().fg(Color::DarkGray),
    ));
    let p = Paragraph::new(Line::from(header))
        .block(Block::default().borders(Borders::ALL).title(" Radar "));
    f.render_widget(p, area);
}

fn draw_screener(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let max_visible = (area.height as usize).saturating_sub(3);
    let start = app.selected.saturating_sub(max_visible.saturating_sub(1));

    let rows: Vec<Row> = app
        .hits
        .iter()
        .enumerate()
        .skip(start)
        .take(max_visible)
        .map(|(i, hit)| {
            let style = if i == app.selected {
                Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            let change_color = if hit.change_pct >= 0.0 { Color::Green } else { Color::Red };
            Row::new(vec![
                Cell::from(hit.trading_date.to_string()),
                Cell::from(Span::styled(format!("{:<6}", hit.instrument_id), Style::default().fg(Color::White))),
                Cell::from(format!("{:.2}x", hit.ratio)),
                Cell::from(format!("{:.0}", hit.conviction_score)),
                Cell::from(Span::styled(format!("{:+.2}%", hit.change_pct), Style::default().fg(change_color))),
                Cell::from(format!("{:.1}B", hit.transaction_value / 1e9)),
                Cell::from(Span::styled(hit.activity.label(), Style::default().fg(activity_color(hit.activity)))),
                Cell::from(format!("{}/{}", hit.smart_money_score, hit.pattern_count)),
            ])
            .style(style)
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(11),
            Constraint::Length(7),
            Constraint::Length(8),
            Constraint::Length(5),
            Constraint::Length(9),
            Constraint::Length(8),
            Constraint::Length(8),
            Constraint::Min(5),
        ],
    )
    .header(
        Row::new(vec!["DATE", "CODE", "RATIO", "CONV", "CHG", "VALUE", "ACTIVITY", "SCORE"])
            .style(Style::default().add_modifier(Modifier::BOLD).fg(Color::White)),
    )
    .block(Block::default().borders(Borders::ALL).title(format!(" Signals ({}) ", app.hits.len())));

    f.render_widget(table, area);
}

fn draw_chart(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let title = match app.hits.get(app.selected) {
        Some(hit) => {
            let name = hit.company_name.as_deref().map(|n| format!(" {n}")).unwrap_or_default();
            let float = match (hit.free_float_pct, hit.free_float_label) {
                (Some(f), Some(label)) => format!(" | float {f:.1}% {label}"),
                _ => String::new(),
            };
            format!(" {}{name} up to {}{float} ", hit.instrument_id, hit.trading_date)
        }
        None => " Chart ".to_string(),
    };
    let max_visible = (area.height as usize).saturating_sub(3);

    let rows: Vec<Row> = app
        .chart
        .iter()
        .rev()
        .take(max_visible)
        .map(|p| {
            let marker = match p.signal_category {
                SignalCategory::Whale => "W",
                SignalCategory::Split => "S",
                SignalCategory::Normal => " ",
            };
            Row::new(vec![
                Cell::from(Span::styled(
                    marker,
                    Style::default().fg(category_color(p.signal_category)).add_modifier(Modifier::BOLD),
                )),
                Cell::from(p.trading_date.to_string()),
                Cell::from(format!("{:.0}", p.close)),
                Cell::from(p.vwma.map_or_else(|| "-".to_string(), |v| format!("{v:.0}"))),
                Cell::from(format!("{:.2}", p.aov_ratio)),
                Cell::from(format!("{:.2}", p.freq_spike_ratio)),
                Cell::from(Span::styled(p.activity.label(), Style::default().fg(activity_color(p.activity)))),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(2),
            Constraint::Length(11),
            Constraint::Length(8),
            Constraint::Length(8),
            Constraint::Length(6),
            Constraint::Length(6),
            Constraint::Min(8),
        ],
    )
    .header(
        Row::new(vec!["", "DATE", "CLOSE", "VWMA", "AOV", "FREQ", "ACTIVITY"])
            .style(Style::default().add_modifier(Modifier::BOLD).fg(Color::White)),
    )
    .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(table, area);
}

fn draw_backtest(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let lines: Vec<Line> = match &app.backtest {
        Some(report) => {
            let mut lines = vec![Line::from(vec![
                Span::styled("  Events: ", Style::default().fg(Color::DarkGray)),
                Span::raw(format!("{}", report.events.len())),
                Span::styled("  Floor: ", Style::default().fg(Color::DarkGray)),
                Span::raw(format!("{:.1}B", report.liquidity_floor / 1e9)),
            ])];
            for s in &report.stats {
                let body = match (s.mean_return, s.win_rate) {
                    (Some(mean), Some(win)) => format!(
                        "n={:<5} mean={:+.2}%  win={:.1}%  median={:+.2}%",
                        s.sample_count,
                        mean * 100.0,
                        win * 100.0,
                        s.distribution.median * 100.0
                    ),
                    _ => "n=0".to_string(),
                };
                lines.push(Line::from(vec![
                    Span::styled(format!("  {:>3}d: ", s.horizon), Style::default().fg(Color::Cyan)),
                    Span::raw(body),
                ]));
            }
            lines
        }
        None => vec![Line::from(Span::styled(
            "  No historical signals with these filters.",
            Style::default().fg(Color::DarkGray),
        ))],
    };
    let widget = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" Backtest: {} ", app.category.label())),
    );
    f.render_widget(widget, area);
}
