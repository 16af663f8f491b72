use crate::{Model, ResultEntry};
use shared::{AnomalyRecord, ValidationReport};
use yew::prelude::*;

pub fn render_results(model: &Model) -> Html {
    if model.results.is_empty() {
        return html! {};
    }

    html! {
        <div id="result-content" class="results-container">
            { for model.results.iter().map(render_entry) }
        </div>
    }
}

fn render_entry(entry: &ResultEntry) -> Html {
    match entry {
        ResultEntry::Line(text) => html! { <p>{ text }</p> },
        ResultEntry::Validation(report) => render_validation(report),
        ResultEntry::Anomalies(anomalies) => render_anomalies(anomalies),
    }
}

fn render_validation(report: &ValidationReport) -> Html {
    html! {
        <div class="detailed-results">
            <h3>{"Validation Results:"}</h3>
            {
                if report.is_clean() {
                    html! { <p>{"No validation issues found."}</p> }
                } else {
                    html! {
                        <ul>
                            { for report.flagged().map(|(invoice, warnings)| html! {
                                <li>
                                    { format!("Invoice {}:", invoice) }
                                    <ul>
                                        { for warnings.iter().map(|w| html! { <li>{ w }</li> }) }
                                    </ul>
                                </li>
                            }) }
                        </ul>
                    }
                }
            }
        </div>
    }
}

fn render_anomalies(anomalies: &[AnomalyRecord]) -> Html {
    html! {
        <div class="detailed-results">
            <h3>{"Detected Anomalies:"}</h3>
            {
                if anomalies.is_empty() {
                    html! { <p>{"No anomalies detected."}</p> }
                } else {
                    html! {
                        <ul>
                            { for anomalies.iter().map(|anomaly| html! {
                                <li>
                                    { format!("Invoice {}: ", anomaly.invoice_label()) }
                                    {
                                        if anomaly.flags.is_empty() {
                                            html! { {"No specific flags"} }
                                        } else {
                                            html! {
                                                <ul>
                                                    { for anomaly.flags.iter().map(|f| html! { <li>{ f }</li> }) }
                                                </ul>
                                            }
                                        }
                                    }
                                </li>
                            }) }
                        </ul>
                    }
                }
            }
        </div>
    }
}
